//! Background task deciding when the sync engine runs.
//!
//! Triggers a run when connectivity returns (after a settle delay) and when
//! the app regains the foreground with votes still queued. A periodic poll
//! keeps the published status fresh without syncing. The monitor itself never
//! touches the queue or the ledger beyond asking the engine to run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{ConnectivityObserver, SyncEngine};
use crate::models::SyncStatusSnapshot;

/// Handle to the running monitor task.
pub struct SyncMonitor {
    status_rx: watch::Receiver<SyncStatusSnapshot>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SyncMonitor {
    /// Start watching `connectivity` on behalf of `engine`.
    pub fn start(engine: SyncEngine, connectivity: Arc<dyn ConnectivityObserver>) -> Self {
        let (status_tx, status_rx) = watch::channel(SyncStatusSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Subscribe before spawning so a transition right after `start` is seen
        let mut signals = MonitorSignals {
            online: connectivity.online_changes(),
            foreground: connectivity.foreground_events(),
        };
        signals.online.borrow_and_update();
        signals.foreground.borrow_and_update();

        let task = tokio::spawn(async move {
            run_monitor_loop(engine, connectivity, signals, status_tx, shutdown_rx).await;
        });

        Self {
            status_rx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Latest published status.
    pub fn status(&self) -> SyncStatusSnapshot {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatusSnapshot> {
        self.status_rx.clone()
    }

    /// Stop the monitor. A run already in progress is allowed to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(Duration::from_secs(30), task).await.is_err() {
                tracing::warn!("Sync monitor did not stop within 30s");
            }
        }
    }
}

impl Drop for SyncMonitor {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}

struct MonitorSignals {
    online: watch::Receiver<bool>,
    foreground: watch::Receiver<u64>,
}

async fn run_monitor_loop(
    engine: SyncEngine,
    connectivity: Arc<dyn ConnectivityObserver>,
    signals: MonitorSignals,
    status: watch::Sender<SyncStatusSnapshot>,
    mut shutdown: watch::Receiver<bool>,
) {
    let options = *engine.options();
    let MonitorSignals {
        online: mut online_rx,
        foreground: mut foreground_rx,
    } = signals;
    let mut was_online = *online_rx.borrow();

    // Runs triggered from anywhere (CLI, other tasks) refresh the published status too
    let publisher = status.clone();
    let _subscription = engine.subscribe(move |snapshot| {
        publisher.send_replace(snapshot.clone());
    });

    let mut poll = tokio::time::interval(options.poll_interval());
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // Settle wait plus run; kept off the loop so polling continues meanwhile
    let mut trigger: Option<JoinHandle<()>> = None;

    tracing::debug!("Sync monitor started (online: {was_online})");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = online_rx.changed() => {
                if changed.is_err() {
                    tracing::debug!("Connectivity source closed, stopping sync monitor");
                    break;
                }
                let online = *online_rx.borrow_and_update();
                let came_online = online && !was_online;
                was_online = online;
                if !came_online {
                    continue;
                }

                if trigger.as_ref().is_some_and(|task| !task.is_finished()) {
                    tracing::debug!("Back online while a sync is already scheduled");
                    continue;
                }
                tracing::info!("Back online, syncing queued votes shortly");
                trigger = Some(spawn_trigger(
                    &engine,
                    &connectivity,
                    Some(options.settle_delay()),
                    shutdown.clone(),
                ));
            }
            changed = foreground_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                foreground_rx.borrow_and_update();
                if !connectivity.is_online()
                    || trigger.as_ref().is_some_and(|task| !task.is_finished())
                {
                    continue;
                }
                match engine.queue().count_pending().await {
                    Ok(0) => {}
                    Ok(pending) => {
                        tracing::info!("Foregrounded with {pending} queued vote(s), syncing");
                        trigger = Some(spawn_trigger(&engine, &connectivity, None, shutdown.clone()));
                    }
                    Err(error) => tracing::warn!("Failed to count queued votes: {error}"),
                }
            }
            _ = poll.tick() => {
                match engine.snapshot().await {
                    Ok(snapshot) => {
                        status.send_if_modified(|current| {
                            if *current == snapshot {
                                false
                            } else {
                                *current = snapshot;
                                true
                            }
                        });
                    }
                    Err(error) => tracing::debug!("Failed to refresh sync status: {error}"),
                }
            }
        }
    }

    // A pending settle wait sees the shutdown; a run in progress finishes
    if let Some(task) = trigger.take() {
        if let Err(error) = task.await {
            tracing::warn!("Sync trigger task failed: {error}");
        }
    }

    tracing::debug!("Sync monitor stopped");
}

fn spawn_trigger(
    engine: &SyncEngine,
    connectivity: &Arc<dyn ConnectivityObserver>,
    settle_delay: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let engine = engine.clone();
    let connectivity = Arc::clone(connectivity);
    tokio::spawn(async move {
        if let Some(delay) = settle_delay {
            tokio::select! {
                _ = shutdown.changed() => return,
                () = tokio::time::sleep(delay) => {}
            }
            if !connectivity.is_online() {
                tracing::debug!("Went offline again during settle delay");
                return;
            }
        }
        engine.run_sync().await;
    })
}
