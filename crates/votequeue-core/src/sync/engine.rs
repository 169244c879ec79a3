//! Replays queued vote intents against the ledger.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::{ConnectivityObserver, SyncOptions};
use crate::ledger::{FailureClass, LedgerClient, LedgerError};
use crate::models::{
    ballot_problem, IntentId, IntentStatus, NewVoteIntent, QueuedVoteIntent, ReceiptOutcome,
    SyncReport, SyncStatusSnapshot,
};
use crate::services::QueueService;
use crate::util::now_millis;
use crate::Result;

const OFFLINE_REASON: &str = "Device is offline";
const NO_SIGNER_REASON: &str = "No transaction signer available";

type StatusListener = Arc<dyn Fn(&SyncStatusSnapshot) + Send + Sync>;

struct EngineInner {
    queue: QueueService,
    ledger: Arc<dyn LedgerClient>,
    connectivity: Arc<dyn ConnectivityObserver>,
    options: SyncOptions,
    syncing: AtomicBool,
    listeners: Mutex<BTreeMap<u64, StatusListener>>,
    next_listener_id: AtomicU64,
}

/// Drains the durable queue into the ledger, one run at a time.
///
/// Cloning is cheap and every clone shares the single-flight flag and the
/// listener registry.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

/// Result of [`SyncEngine::cast_vote_or_queue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastOutcome {
    /// The ledger accepted the vote directly
    Submitted { transaction_id: String },
    /// The vote was stored for a later sync run
    Queued { intent_id: IntentId, reason: String },
}

impl CastOutcome {
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            Self::Submitted { transaction_id } => Some(transaction_id),
            Self::Queued { .. } => None,
        }
    }

    pub const fn intent_id(&self) -> Option<&IntentId> {
        match self {
            Self::Queued { intent_id, .. } => Some(intent_id),
            Self::Submitted { .. } => None,
        }
    }
}

/// Listener registration returned by [`SyncEngine::subscribe`].
///
/// Dropping it unsubscribes.
#[must_use = "dropping the subscription removes the listener"]
pub struct Subscription {
    engine: Weak<EngineInner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.engine.upgrade() {
            if let Ok(mut listeners) = inner.listeners.lock() {
                listeners.remove(&self.id);
            }
        }
    }
}

/// Clears the single-flight flag when a run ends, however it ends
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

enum IntentOutcome {
    /// Vote is on the ledger; `submitted` when this run sent it
    Confirmed { submitted: bool },
    Failed(String),
    /// Intent disappeared mid-run
    Skipped,
}

impl SyncEngine {
    pub fn new(
        queue: QueueService,
        ledger: Arc<dyn LedgerClient>,
        connectivity: Arc<dyn ConnectivityObserver>,
        options: SyncOptions,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                queue,
                ledger,
                connectivity,
                options,
                syncing: AtomicBool::new(false),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn queue(&self) -> &QueueService {
        &self.inner.queue
    }

    pub fn options(&self) -> &SyncOptions {
        &self.inner.options
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    /// Submit a vote directly, or queue it when the ledger cannot be reached.
    ///
    /// Malformed selections are rejected before anything is stored. Ledger
    /// errors other than unavailability are returned to the caller.
    pub async fn cast_vote_or_queue(&self, intent: NewVoteIntent) -> Result<CastOutcome> {
        let ballot = intent.ballot();
        if let Some(problem) = ballot_problem(&ballot) {
            return Err(LedgerError::InvalidParameters(problem).into());
        }

        let reason = if !self.inner.connectivity.is_online() {
            OFFLINE_REASON.to_string()
        } else if !self.inner.ledger.signer_available() {
            NO_SIGNER_REASON.to_string()
        } else {
            match self.inner.ledger.submit_vote(&ballot).await {
                Ok(transaction_id) => {
                    tracing::info!(
                        "Vote for voter {} submitted directly: {transaction_id}",
                        ballot.voter_key
                    );
                    return Ok(CastOutcome::Submitted { transaction_id });
                }
                Err(error) if error.is_unavailable() => error.to_string(),
                Err(error) => return Err(error.into()),
            }
        };

        let intent_id = self.inner.queue.enqueue(intent).await?;
        tracing::info!("Vote {intent_id} queued for later sync: {reason}");
        Ok(CastOutcome::Queued { intent_id, reason })
    }

    /// Drain every `pending` intent, oldest first.
    ///
    /// Returns a zero-work report when a run is already active.
    pub async fn run_sync(&self) -> SyncReport {
        let Some(guard) = RunGuard::acquire(&self.inner.syncing) else {
            tracing::debug!("Sync already in progress, skipping");
            return SyncReport::empty();
        };

        if !self.inner.connectivity.is_online() {
            tracing::debug!("Skipping sync: device is offline");
            return SyncReport::refused(OFFLINE_REASON);
        }

        if !self.inner.ledger.signer_available() {
            tracing::warn!("Skipping sync: no transaction signer available");
            if let Err(error) = self
                .inner
                .queue
                .record_sync_outcome(None, Some(NO_SIGNER_REASON))
                .await
            {
                tracing::warn!("Failed to persist sync error: {error}");
            }
            return SyncReport::refused(NO_SIGNER_REASON);
        }

        let mut report = self.drain_pending().await;

        if let Err(error) = self
            .inner
            .queue
            .record_sync_outcome(Some(now_millis()), report.joined_errors().as_deref())
            .await
        {
            tracing::warn!("Failed to persist sync outcome: {error}");
            report.errors.push(format!("Failed to persist sync outcome: {error}"));
        }

        tracing::info!(
            "Sync finished: {} succeeded, {} failed",
            report.success_count,
            report.failed_count
        );

        drop(guard);
        if let Err(error) = self.notify_now().await {
            tracing::warn!("Failed to build sync status snapshot: {error}");
        }

        report
    }

    async fn drain_pending(&self) -> SyncReport {
        // Only this run can own `syncing` rows while the guard is held
        if let Err(error) = self.inner.queue.requeue_interrupted().await {
            tracing::warn!("Failed to requeue interrupted votes: {error}");
        }

        let mut pending = match self.inner.queue.list_by_status(IntentStatus::Pending).await {
            Ok(pending) => pending,
            Err(error) => return SyncReport::refused(format!("Failed to load queued votes: {error}")),
        };
        pending.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut report = SyncReport::empty();
        if pending.is_empty() {
            return report;
        }
        tracing::info!("Syncing {} queued vote(s)", pending.len());

        let total = pending.len();
        for (index, intent) in pending.iter().enumerate() {
            let outcome = match self.sync_intent(intent).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!("Storage error while syncing vote {}: {error}", intent.id);
                    IntentOutcome::Failed(error.to_string())
                }
            };

            match outcome {
                IntentOutcome::Confirmed { submitted } => {
                    report.success_count += 1;
                    let delay = self.inner.options.inter_item_delay();
                    if submitted && index + 1 < total && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                IntentOutcome::Failed(message) => {
                    report.failed_count += 1;
                    report.errors.push(format!("Vote {}: {message}", intent.id));
                }
                IntentOutcome::Skipped => {
                    tracing::debug!("Vote {} vanished during sync", intent.id);
                }
            }
        }

        report
    }

    async fn sync_intent(&self, intent: &QueuedVoteIntent) -> Result<IntentOutcome> {
        match self.inner.ledger.has_already_voted(&intent.voter_key).await {
            Ok(true) => {
                tracing::debug!(
                    "Voter {} already on the ledger, confirming vote {}",
                    intent.voter_key,
                    intent.id
                );
                self.confirm(intent, ReceiptOutcome::AlreadyRecorded, None)
                    .await?;
                return Ok(IntentOutcome::Confirmed { submitted: false });
            }
            Ok(false) => {}
            Err(error) => {
                // Never reached the submit step: stays pending, no attempt spent
                let message = error.to_string();
                tracing::warn!("Vote status check failed for {}: {message}", intent.id);
                self.mark(&intent.id, IntentStatus::Pending, &message).await?;
                return Ok(IntentOutcome::Failed(message));
            }
        }

        let attempt = match self
            .inner
            .queue
            .update_status(&intent.id, IntentStatus::Syncing, None)
            .await
        {
            Ok(updated) => updated.retry_count,
            Err(error) if error.is_not_found() => return Ok(IntentOutcome::Skipped),
            Err(error) => return Err(error),
        };
        tracing::debug!("Submitting vote {} (attempt {attempt})", intent.id);

        match self.inner.ledger.submit_vote(&intent.ballot()).await {
            Ok(transaction_id) => {
                self.confirm(intent, ReceiptOutcome::Submitted, Some(&transaction_id))
                    .await?;
                tracing::info!("Vote {} synced: {transaction_id}", intent.id);
                Ok(IntentOutcome::Confirmed { submitted: true })
            }
            Err(error) => self.handle_submit_error(intent, attempt, &error).await,
        }
    }

    async fn handle_submit_error(
        &self,
        intent: &QueuedVoteIntent,
        attempt: u32,
        error: &LedgerError,
    ) -> Result<IntentOutcome> {
        let message = error.to_string();
        match error.class() {
            FailureClass::AlreadyRecorded => {
                self.confirm(intent, ReceiptOutcome::AlreadyRecorded, None)
                    .await?;
                tracing::info!("Vote {} already recorded on the ledger", intent.id);
                Ok(IntentOutcome::Confirmed { submitted: false })
            }
            FailureClass::Permanent => {
                tracing::error!("Vote {} failed permanently: {message}", intent.id);
                self.mark(&intent.id, IntentStatus::Failed, &message).await?;
                Ok(IntentOutcome::Failed(message))
            }
            FailureClass::Transient if attempt >= self.inner.options.max_attempts => {
                tracing::error!(
                    "Vote {} failed after {attempt} attempts: {message}",
                    intent.id
                );
                self.mark(&intent.id, IntentStatus::Failed, &message).await?;
                Ok(IntentOutcome::Failed(message))
            }
            FailureClass::Transient => {
                tracing::warn!(
                    "Vote {} will be retried (attempt {attempt}): {message}",
                    intent.id
                );
                self.mark(&intent.id, IntentStatus::Pending, &message).await?;
                Ok(IntentOutcome::Failed(message))
            }
        }
    }

    /// Terminal success: synced, deleted, receipt written
    async fn confirm(
        &self,
        intent: &QueuedVoteIntent,
        outcome: ReceiptOutcome,
        transaction_id: Option<&str>,
    ) -> Result<()> {
        match self
            .inner
            .queue
            .update_status(&intent.id, IntentStatus::Synced, None)
            .await
        {
            Ok(_) => {}
            Err(error) if error.is_not_found() => {}
            Err(error) => return Err(error),
        }
        self.inner.queue.remove(&intent.id).await?;

        if let Err(error) = self
            .inner
            .queue
            .record_receipt(&intent.id, &intent.voter_key, outcome, transaction_id)
            .await
        {
            tracing::warn!("Failed to record receipt for vote {}: {error}", intent.id);
        }
        Ok(())
    }

    async fn mark(&self, id: &IntentId, status: IntentStatus, message: &str) -> Result<()> {
        match self.inner.queue.update_status(id, status, Some(message)).await {
            Ok(_) => Ok(()),
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Current status built from the store and the single-flight flag
    pub async fn snapshot(&self) -> Result<SyncStatusSnapshot> {
        let queue = &self.inner.queue;
        Ok(SyncStatusSnapshot {
            is_syncing: self.is_syncing(),
            pending_count: queue.count_pending().await?,
            last_sync_time: queue.last_sync_time().await?,
            last_error: queue.last_error().await?,
        })
    }

    /// Register a callback invoked with a fresh snapshot after every run.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncStatusSnapshot) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(id, Arc::new(listener));
        }
        Subscription {
            engine: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Push the current snapshot to every listener right away.
    pub async fn notify_now(&self) -> Result<()> {
        let snapshot = self.snapshot().await?;
        self.notify_listeners(&snapshot);
        Ok(())
    }

    fn notify_listeners(&self, snapshot: &SyncStatusSnapshot) {
        let listeners: Vec<StatusListener> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => return,
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
                tracing::error!("Sync status listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ledger::testing::ScriptedLedger;
    use crate::models::VoterKey;
    use crate::sync::ConnectivitySignal;
    use crate::Error;

    fn options() -> SyncOptions {
        SyncOptions::default().with_inter_item_delay(Duration::ZERO)
    }

    async fn engine_with(ledger: &ScriptedLedger, signal: &ConnectivitySignal) -> SyncEngine {
        let queue = QueueService::open_in_memory().await.unwrap();
        SyncEngine::new(
            queue,
            Arc::new(ledger.clone()),
            Arc::new(signal.clone()),
            options(),
        )
    }

    fn intent(voter: &str, candidate: &str) -> NewVoteIntent {
        NewVoteIntent::new(VoterKey::parse(voter).unwrap(), candidate, "7")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drains_queue_oldest_first() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        for voter in ["A1", "B2", "C3"] {
            engine.queue().enqueue(intent(voter, "1")).await.unwrap();
        }

        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 3);
        assert_eq!(report.failed_count, 0);
        assert!(report.errors.is_empty());

        let order: Vec<String> = ledger
            .submitted()
            .iter()
            .map(|ballot| ballot.voter_key.to_string())
            .collect();
        assert_eq!(order, vec!["A1", "B2", "C3"]);
        assert!(engine.queue().list_all().await.unwrap().is_empty());
        assert!(engine.queue().last_sync_time().await.unwrap().is_some());
        assert_eq!(engine.queue().last_error().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_intent_for_same_voter_is_confirmed_by_precheck() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        engine.queue().enqueue(intent("V1", "3")).await.unwrap();
        engine.queue().enqueue(intent("V1", "4")).await.unwrap();

        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_count, 0);
        assert_eq!(ledger.submitted().len(), 1);
        assert_eq!(ledger.submitted()[0].candidate_selection, "3");
        assert!(engine.queue().list_all().await.unwrap().is_empty());

        let receipts = engine.queue().list_receipts(10).await.unwrap();
        assert_eq!(receipts.len(), 2);
        let submitted = receipts
            .iter()
            .filter(|r| r.outcome == ReceiptOutcome::Submitted)
            .count();
        let recorded = receipts
            .iter()
            .filter(|r| r.outcome == ReceiptOutcome::AlreadyRecorded)
            .count();
        assert_eq!((submitted, recorded), (1, 1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn voter_already_on_ledger_is_never_submitted() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        let voter = VoterKey::parse("V9").unwrap();
        ledger.mark_voted(&voter);
        engine.queue().enqueue(intent("V9", "1")).await.unwrap();

        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 1);
        assert!(ledger.submitted().is_empty());
        let receipts = engine.queue().list_receipts(1).await.unwrap();
        assert_eq!(receipts[0].outcome, ReceiptOutcome::AlreadyRecorded);
        assert_eq!(receipts[0].transaction_id, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_runs_drain_once() {
        let (ledger, gate) = ScriptedLedger::new().gated();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        engine.queue().enqueue(intent("S1", "1")).await.unwrap();

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_sync().await }
        });
        ledger.entered_submit.notified().await;
        assert!(engine.is_syncing());

        let second = engine.run_sync().await;
        assert!(second.is_noop());

        gate.add_permits(1);
        let first = first.await.unwrap();
        assert_eq!(first.success_count, 1);
        assert_eq!(ledger.submitted().len(), 1);
        assert!(!engine.is_syncing());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failure_fails_after_three_runs() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        let id = engine.queue().enqueue(intent("T1", "1")).await.unwrap();
        for _ in 0..3 {
            ledger.script_submit(Err(LedgerError::Unavailable("rpc down".into())));
        }

        for expected_retries in 1..=2 {
            let report = engine.run_sync().await;
            assert_eq!(report.failed_count, 1);
            let queued = engine.queue().get(&id).await.unwrap().unwrap();
            assert_eq!(queued.status, IntentStatus::Pending);
            assert_eq!(queued.retry_count, expected_retries);
            assert_eq!(
                queued.last_error.as_deref(),
                Some("Ledger unavailable: rpc down")
            );
        }

        engine.run_sync().await;
        let queued = engine.queue().get(&id).await.unwrap().unwrap();
        assert_eq!(queued.status, IntentStatus::Failed);
        assert_eq!(queued.retry_count, 3);

        let report = engine.run_sync().await;
        assert_eq!(report, SyncReport::empty());
        assert_eq!(ledger.submitted().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_parameters_fail_immediately_and_are_retained() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        let id = engine.queue().enqueue(intent("P1", "1")).await.unwrap();
        ledger.script_submit(Err(LedgerError::InvalidParameters("unknown ward".into())));

        let report = engine.run_sync().await;
        assert_eq!(report.failed_count, 1);
        assert_eq!(
            report.errors,
            vec![format!("Vote {id}: Invalid vote parameters: unknown ward")]
        );

        let queued = engine.queue().get(&id).await.unwrap().unwrap();
        assert_eq!(queued.status, IntentStatus::Failed);
        assert_eq!(queued.retry_count, 1);

        let next = engine.run_sync().await;
        assert_eq!(next.success_count + next.failed_count, 0);
        assert_eq!(ledger.submitted().len(), 1);
        assert_eq!(engine.queue().list_all().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_fails_immediately() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        let id = engine.queue().enqueue(intent("R1", "1")).await.unwrap();
        ledger.script_submit(Err(LedgerError::Rejected));

        engine.run_sync().await;
        let queued = engine.queue().get(&id).await.unwrap().unwrap();
        assert_eq!(queued.status, IntentStatus::Failed);
        assert_eq!(
            queued.last_error.as_deref(),
            Some("Transaction rejected by signer")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn already_voted_on_submit_counts_as_success() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        engine.queue().enqueue(intent("D1", "1")).await.unwrap();
        ledger.script_submit(Err(LedgerError::AlreadyVoted));

        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 0);
        assert!(engine.queue().list_all().await.unwrap().is_empty());
        let receipts = engine.queue().list_receipts(1).await.unwrap();
        assert_eq!(receipts[0].outcome, ReceiptOutcome::AlreadyRecorded);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn precheck_failure_keeps_intent_pending_without_spending_attempt() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        let id = engine.queue().enqueue(intent("Q1", "1")).await.unwrap();
        ledger.script_precheck_error(LedgerError::Unavailable("timeout".into()));

        let report = engine.run_sync().await;
        assert_eq!(report.failed_count, 1);
        assert!(report.errors[0].starts_with(&format!("Vote {id}:")));
        assert!(ledger.submitted().is_empty());

        let queued = engine.queue().get(&id).await.unwrap().unwrap();
        assert_eq!(queued.status, IntentStatus::Pending);
        assert_eq!(queued.retry_count, 0);
        assert_eq!(
            engine.queue().last_error().await.unwrap(),
            Some(format!("Vote {id}: Ledger unavailable: timeout"))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clean_run_clears_previous_error() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        engine.queue().enqueue(intent("E1", "1")).await.unwrap();
        ledger.script_submit(Err(LedgerError::Unknown("boom".into())));

        engine.run_sync().await;
        assert!(engine.queue().last_error().await.unwrap().is_some());

        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 1);
        assert_eq!(engine.queue().last_error().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_run_is_refused_without_touching_queue() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(false)).await;
        let id = engine.queue().enqueue(intent("O1", "1")).await.unwrap();

        let report = engine.run_sync().await;
        assert_eq!(report.errors, vec!["Device is offline".to_string()]);
        assert_eq!(report.success_count + report.failed_count, 0);
        assert_eq!(ledger.precheck_calls(), 0);
        assert_eq!(engine.queue().last_sync_time().await.unwrap(), None);

        let queued = engine.queue().get(&id).await.unwrap().unwrap();
        assert_eq!(queued.status, IntentStatus::Pending);
        assert_eq!(queued.retry_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_signer_is_refused_and_persisted() {
        let ledger = ScriptedLedger::new();
        ledger.set_signer(false);
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        engine.queue().enqueue(intent("N1", "1")).await.unwrap();

        let report = engine.run_sync().await;
        assert_eq!(report.errors, vec![NO_SIGNER_REASON.to_string()]);
        assert_eq!(ledger.precheck_calls(), 0);
        assert_eq!(
            engine.queue().last_error().await.unwrap().as_deref(),
            Some(NO_SIGNER_REASON)
        );
        assert_eq!(engine.queue().count_pending().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn inter_item_delay_separates_submissions() {
        let ledger = ScriptedLedger::new();
        let queue = QueueService::open_in_memory().await.unwrap();
        let engine = SyncEngine::new(
            queue,
            Arc::new(ledger.clone()),
            Arc::new(ConnectivitySignal::new(true)),
            SyncOptions::default().with_inter_item_delay(Duration::from_millis(60)),
        );
        engine.queue().enqueue(intent("W1", "1")).await.unwrap();
        engine.queue().enqueue(intent("W2", "1")).await.unwrap();

        let started = Instant::now();
        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 2);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_delay_after_vote_the_ledger_already_had() {
        let ledger = ScriptedLedger::new();
        let queue = QueueService::open_in_memory().await.unwrap();
        let engine = SyncEngine::new(
            queue,
            Arc::new(ledger.clone()),
            Arc::new(ConnectivitySignal::new(true)),
            SyncOptions::default().with_inter_item_delay(Duration::from_secs(5)),
        );
        engine.queue().enqueue(intent("W3", "1")).await.unwrap();
        engine.queue().enqueue(intent("W4", "1")).await.unwrap();
        ledger.script_submit(Err(LedgerError::AlreadyVoted));
        ledger.mark_voted(&VoterKey::parse("W4").unwrap());

        let started = Instant::now();
        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 2);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn listeners_are_notified_after_run_and_panics_are_contained() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        engine.queue().enqueue(intent("L1", "1")).await.unwrap();

        let _panicking = engine.subscribe(|_| panic!("listener bug"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _recording = engine.subscribe({
            let seen = Arc::clone(&seen);
            move |snapshot| seen.lock().unwrap().push(snapshot.clone())
        });

        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].pending_count, 0);
        assert!(!seen[0].is_syncing);
        assert!(seen[0].last_sync_time.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropped_subscription_stops_notifications() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let subscription = engine.subscribe({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
        engine.notify_now().await.unwrap();
        subscription.unsubscribe();
        engine.notify_now().await.unwrap();
        engine.run_sync().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interrupted_run_leaves_intent_for_next_run() {
        let (ledger, gate) = ScriptedLedger::new().gated();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        let id = engine.queue().enqueue(intent("I1", "1")).await.unwrap();

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_sync().await }
        });
        ledger.entered_submit.notified().await;
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        assert!(!engine.is_syncing());

        let stranded = engine.queue().get(&id).await.unwrap().unwrap();
        assert_eq!(stranded.status, IntentStatus::Syncing);

        gate.add_permits(1);
        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 0);
        assert_eq!(ledger.submitted().len(), 1);
        assert!(engine.queue().list_all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cast_reports_unavailable_storage_when_queueing() {
        let ledger = ScriptedLedger::new();
        let engine = SyncEngine::new(
            QueueService::unavailable("disk full"),
            Arc::new(ledger.clone()),
            Arc::new(ConnectivitySignal::new(false)),
            options(),
        );

        let error = engine
            .cast_vote_or_queue(intent("U1", "1"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::StorageUnavailable(reason) if reason == "disk full"));
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_on_unavailable_storage_reports_error() {
        let ledger = ScriptedLedger::new();
        let engine = SyncEngine::new(
            QueueService::unavailable("disk full"),
            Arc::new(ledger.clone()),
            Arc::new(ConnectivitySignal::new(true)),
            options(),
        );

        let report = engine.run_sync().await;
        assert_eq!(report.success_count, 0);
        assert!(!report.errors.is_empty());
        assert!(report.errors[0].contains("disk full"));
        assert_eq!(ledger.precheck_calls(), 0);
        assert!(!engine.is_syncing());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cast_submits_directly_when_online() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;

        let outcome = engine.cast_vote_or_queue(intent("C1", "42")).await.unwrap();
        assert_eq!(
            outcome,
            CastOutcome::Submitted {
                transaction_id: "0xTX1".to_string()
            }
        );
        assert!(!outcome.is_queued());
        assert_eq!(engine.queue().count_pending().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cast_queues_when_offline_or_unavailable() {
        let ledger = ScriptedLedger::new();
        let signal = ConnectivitySignal::new(false);
        let engine = engine_with(&ledger, &signal).await;

        let offline = engine.cast_vote_or_queue(intent("C2", "1")).await.unwrap();
        assert!(offline.is_queued());
        assert!(ledger.submitted().is_empty());

        signal.set_online(true);
        ledger.script_submit(Err(LedgerError::Unavailable("gateway down".into())));
        let unavailable = engine.cast_vote_or_queue(intent("C3", "1")).await.unwrap();
        assert!(unavailable.is_queued());
        assert_eq!(unavailable.transaction_id(), None);

        ledger.set_signer(false);
        let unsigned = engine.cast_vote_or_queue(intent("C4", "1")).await.unwrap();
        assert!(unsigned.is_queued());

        assert_eq!(engine.queue().count_pending().await.unwrap(), 3);
        let queued = engine
            .queue()
            .get(offline.intent_id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queued.voter_key.as_str(), "C2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cast_surfaces_non_transient_ledger_errors() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(true)).await;
        ledger.script_submit(Err(LedgerError::Rejected));

        let error = engine
            .cast_vote_or_queue(intent("C5", "1"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Ledger(LedgerError::Rejected)));
        assert_eq!(engine.queue().count_pending().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cast_rejects_malformed_selection_before_queueing() {
        let ledger = ScriptedLedger::new();
        let engine = engine_with(&ledger, &ConnectivitySignal::new(false)).await;

        let error = engine
            .cast_vote_or_queue(intent("C6", "Jane Doe"))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Ledger(LedgerError::InvalidParameters(_))
        ));
        assert_eq!(engine.queue().count_pending().await.unwrap(), 0);
    }
}
