//! Shared durable vote queue service.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::db::{
    Database, LibSqlQueueRepository, LibSqlSyncStateRepository, QueueRepository,
    SyncStateRepository,
};
use crate::models::{
    IntentId, IntentStatus, NewVoteIntent, QueuedVoteIntent, ReceiptOutcome, SyncReceipt,
    VoterKey,
};
use crate::{Error, Result};

const INTERRUPTED_REASON: &str = "Sync was interrupted before the ledger answered";

enum Backend {
    Ready(Mutex<Database>),
    /// Opening failed; every operation reports this cause
    Unavailable(String),
}

/// Thread-safe handle to the durable queue and its persisted sync scalars.
///
/// Cloning shares the same underlying database.
#[derive(Clone)]
pub struct QueueService {
    backend: Arc<Backend>,
}

impl QueueService {
    /// Open the queue at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self::open_database_with_recovery(&db_path).await?;
        let service = Self::from_database(db);
        service.requeue_interrupted().await?;
        Ok(service)
    }

    /// Open the queue, falling back to a degraded handle when storage is unavailable.
    ///
    /// The degraded handle fails every call with `Error::StorageUnavailable`
    /// so vote casting can report the problem instead of crashing.
    pub async fn open_path_or_degraded(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        match Self::open_path(db_path.clone()).await {
            Ok(service) => service,
            Err(error) => {
                tracing::warn!(
                    "Vote queue storage at {} is unavailable: {}",
                    db_path.display(),
                    error
                );
                Self::unavailable(error.to_string())
            }
        }
    }

    /// Open an in-memory queue (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db))
    }

    /// A queue whose storage could not be initialized.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            backend: Arc::new(Backend::Unavailable(reason.into())),
        }
    }

    fn from_database(db: Database) -> Self {
        Self {
            backend: Arc::new(Backend::Ready(Mutex::new(db))),
        }
    }

    /// Whether storage opened successfully.
    pub fn is_available(&self) -> bool {
        matches!(*self.backend, Backend::Ready(_))
    }

    async fn db(&self) -> Result<MutexGuard<'_, Database>> {
        match &*self.backend {
            Backend::Ready(db) => Ok(db.lock().await),
            Backend::Unavailable(reason) => Err(Error::StorageUnavailable(reason.clone())),
        }
    }

    async fn open_database_with_recovery(db_path: &Path) -> Result<Database> {
        match Database::open(db_path).await {
            Ok(db) => Ok(db),
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Vote queue file at {} is not a database: {}. Moving it aside and starting fresh.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(db_path)?;
                Database::open(db_path).await
            }
            Err(error) => Err(error),
        }
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("database disk image is malformed")
    }

    /// Rename the unreadable file so nothing queued in it is destroyed, and drop stale sidecars.
    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };

        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted vote queue file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        for suffix in ["-wal", "-shm"] {
            let sidecar = parent.join(format!("{base_name}{suffix}"));
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
                tracing::warn!("Removed stale sidecar file {}", sidecar.display());
            }
        }

        Ok(())
    }

    /// Queue a new intent as `pending`, returning its id.
    pub async fn enqueue(&self, intent: NewVoteIntent) -> Result<IntentId> {
        let queued = QueuedVoteIntent::new(intent);
        let db = self.db().await?;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.insert(&queued).await?;
        tracing::info!(
            "Queued vote {} for voter {} (candidate {})",
            queued.id,
            queued.voter_key,
            queued.candidate_label()
        );
        Ok(queued.id)
    }

    /// Fetch an intent by id.
    pub async fn get(&self, id: &IntentId) -> Result<Option<QueuedVoteIntent>> {
        let db = self.db().await?;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.get(id).await
    }

    /// All intents in the given status, unordered.
    pub async fn list_by_status(&self, status: IntentStatus) -> Result<Vec<QueuedVoteIntent>> {
        let db = self.db().await?;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.list_by_status(status).await
    }

    /// Every queued intent, for diagnostics.
    pub async fn list_all(&self) -> Result<Vec<QueuedVoteIntent>> {
        let db = self.db().await?;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.list_all().await
    }

    /// Move an intent to `status`; `Error::NotFound` if it no longer exists.
    pub async fn update_status(
        &self,
        id: &IntentId,
        status: IntentStatus,
        error: Option<&str>,
    ) -> Result<QueuedVoteIntent> {
        let db = self.db().await?;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.update_status(id, status, error).await
    }

    /// Delete an intent. Removing an absent id succeeds.
    pub async fn remove(&self, id: &IntentId) -> Result<()> {
        let db = self.db().await?;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.remove(id).await
    }

    pub async fn count_pending(&self) -> Result<usize> {
        let db = self.db().await?;
        let repo = LibSqlQueueRepository::new(db.connection());
        repo.count_by_status(IntentStatus::Pending).await
    }

    /// Return intents stranded in `syncing` by an interrupted run to `pending`.
    ///
    /// `retry_count` is kept, so the attempt that was cut short still counts.
    pub async fn requeue_interrupted(&self) -> Result<u64> {
        let db = self.db().await?;
        let repo = LibSqlQueueRepository::new(db.connection());
        let moved = repo
            .reset_status(IntentStatus::Syncing, IntentStatus::Pending, INTERRUPTED_REASON)
            .await?;
        if moved > 0 {
            tracing::warn!("Requeued {moved} vote(s) left in syncing by an interrupted run");
        }
        Ok(moved)
    }

    /// Drop rows left behind in `synced`, returning how many were removed.
    pub async fn clear_synced(&self) -> Result<u64> {
        let db = self.db().await?;
        let repo = LibSqlQueueRepository::new(db.connection());
        let removed = repo.clear_by_status(IntentStatus::Synced).await?;
        if removed > 0 {
            tracing::info!("Cleared {removed} synced vote(s) from the queue");
        }
        Ok(removed)
    }

    pub async fn last_sync_time(&self) -> Result<Option<i64>> {
        let db = self.db().await?;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        repo.last_sync_time().await
    }

    pub async fn last_error(&self) -> Result<Option<String>> {
        let db = self.db().await?;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        repo.last_error().await
    }

    /// Persist the outcome scalars of a completed run.
    pub async fn record_sync_outcome(
        &self,
        finished_at: Option<i64>,
        last_error: Option<&str>,
    ) -> Result<()> {
        let db = self.db().await?;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        if let Some(finished_at) = finished_at {
            repo.set_last_sync_time(finished_at).await?;
        }
        repo.set_last_error(last_error).await
    }

    pub async fn record_receipt(
        &self,
        intent_id: &IntentId,
        voter_key: &VoterKey,
        outcome: ReceiptOutcome,
        transaction_id: Option<&str>,
    ) -> Result<()> {
        let db = self.db().await?;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        repo.record_receipt(intent_id, voter_key, outcome, transaction_id)
            .await
    }

    pub async fn list_receipts(&self, limit: usize) -> Result<Vec<SyncReceipt>> {
        let db = self.db().await?;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        repo.list_receipts(limit).await
    }
}
