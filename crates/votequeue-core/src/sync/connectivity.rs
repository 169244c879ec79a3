//! Online/offline and foreground signals the monitor reacts to.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Source of connectivity and app lifecycle events
pub trait ConnectivityObserver: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver that changes whenever the online flag flips
    fn online_changes(&self) -> watch::Receiver<bool>;

    /// Receiver whose counter bumps each time the app regains the foreground
    fn foreground_events(&self) -> watch::Receiver<u64>;
}

struct SignalChannels {
    online: watch::Sender<bool>,
    foreground: watch::Sender<u64>,
}

/// Manually driven connectivity signal.
///
/// Clones share the same channels, so one side can feed events while the
/// monitor watches.
#[derive(Clone)]
pub struct ConnectivitySignal {
    channels: Arc<SignalChannels>,
}

impl ConnectivitySignal {
    pub fn new(initially_online: bool) -> Self {
        let (online, _) = watch::channel(initially_online);
        let (foreground, _) = watch::channel(0);
        Self {
            channels: Arc::new(SignalChannels { online, foreground }),
        }
    }

    /// Update the online flag. Receivers only wake on an actual change.
    pub fn set_online(&self, online: bool) {
        let changed = self.channels.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    pub fn notify_foreground(&self) {
        self.channels
            .foreground
            .send_modify(|count| *count = count.wrapping_add(1));
    }
}

impl ConnectivityObserver for ConnectivitySignal {
    fn is_online(&self) -> bool {
        *self.channels.online.borrow()
    }

    fn online_changes(&self) -> watch::Receiver<bool> {
        self.channels.online.subscribe()
    }

    fn foreground_events(&self) -> watch::Receiver<u64> {
        self.channels.foreground.subscribe()
    }
}

/// Background task that polls an HTTP health endpoint and feeds a signal
pub struct HealthProbe {
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl HealthProbe {
    /// Start polling `url` every `interval`; 2xx responses count as online.
    pub fn start(
        url: impl Into<String>,
        interval: Duration,
        signal: ConnectivitySignal,
    ) -> crate::Result<Self> {
        let url = url.into();
        if !crate::util::is_http_url(&url) {
            return Err(crate::Error::InvalidInput(format!(
                "health URL must include http:// or https://: {url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(interval.max(Duration::from_secs(1)))
            .build()
            .map_err(|e| crate::Error::InvalidInput(format!("failed to build HTTP client: {e}")))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_probe_loop(client, url, interval, signal, shutdown_rx));

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthProbe {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One-shot reachability check; any 2xx answer within `timeout` is online.
pub async fn check_health(url: &str, timeout: Duration) -> bool {
    match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => probe(&client, url).await,
        Err(error) => {
            tracing::warn!("Failed to build health check client: {error}");
            false
        }
    }
}

async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(error) => {
            tracing::debug!("Health probe failed: {error}");
            false
        }
    }
}

async fn run_probe_loop(
    client: reqwest::Client,
    url: String,
    interval: Duration,
    signal: ConnectivitySignal,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {
                signal.set_online(probe(&client, &url).await);
            }
        }
    }
}
