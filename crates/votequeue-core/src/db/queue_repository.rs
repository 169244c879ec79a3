//! Vote queue repository implementation

use crate::error::{Error, Result};
use crate::models::{IntentId, IntentStatus, QueuedVoteIntent, VoterKey};
use libsql::{Connection, Value};

const INTENT_COLUMNS: &str = "id, voter_key, candidate_selection, ward_selection, enqueued_at, \
                              status, retry_count, last_error, display_label";

/// Trait for queued vote storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Persist a freshly created intent
    async fn insert(&self, intent: &QueuedVoteIntent) -> Result<()>;

    /// Get an intent by ID
    async fn get(&self, id: &IntentId) -> Result<Option<QueuedVoteIntent>>;

    /// List intents in the given status (no ordering guarantee)
    async fn list_by_status(&self, status: IntentStatus) -> Result<Vec<QueuedVoteIntent>>;

    /// List every intent, oldest first
    async fn list_all(&self) -> Result<Vec<QueuedVoteIntent>>;

    /// Set status (and optionally the last error); bumps `retry_count` when entering `syncing`
    async fn update_status(
        &self,
        id: &IntentId,
        status: IntentStatus,
        error: Option<&str>,
    ) -> Result<QueuedVoteIntent>;

    /// Delete an intent; absent ids are not an error
    async fn remove(&self, id: &IntentId) -> Result<()>;

    /// Count intents in the given status
    async fn count_by_status(&self, status: IntentStatus) -> Result<usize>;

    /// Delete every intent in the given status, returning how many were removed
    async fn clear_by_status(&self, status: IntentStatus) -> Result<u64>;

    /// Move every intent in `from` to `to`, leaving `retry_count` untouched
    async fn reset_status(&self, from: IntentStatus, to: IntentStatus, error: &str) -> Result<u64>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an intent from a database row
    fn parse_intent(row: &libsql::Row) -> Result<QueuedVoteIntent> {
        let id: String = row.get(0)?;
        let voter_key: String = row.get(1)?;
        let status: String = row.get(5)?;
        let retry_count: i64 = row.get(6)?;

        Ok(QueuedVoteIntent {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Corrupt intent id in queue: {id}")))?,
            voter_key: VoterKey::parse(&voter_key)?,
            candidate_selection: row.get(2)?,
            ward_selection: row.get(3)?,
            enqueued_at: row.get(4)?,
            status: status.parse()?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            last_error: row.get(7)?,
            display_label: row.get(8)?,
        })
    }

    async fn collect(&self, sql: &str, params: Vec<Value>) -> Result<Vec<QueuedVoteIntent>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut intents = Vec::new();
        while let Some(row) = rows.next().await? {
            intents.push(Self::parse_intent(&row)?);
        }
        Ok(intents)
    }
}

fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn insert(&self, intent: &QueuedVoteIntent) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO queued_votes (id, voter_key, candidate_selection, ward_selection, \
                 enqueued_at, status, retry_count, last_error, display_label) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                vec![
                    Value::Text(intent.id.as_str()),
                    Value::Text(intent.voter_key.to_string()),
                    Value::Text(intent.candidate_selection.clone()),
                    Value::Text(intent.ward_selection.clone()),
                    Value::Integer(intent.enqueued_at),
                    Value::Text(intent.status.as_str().to_string()),
                    Value::Integer(i64::from(intent.retry_count)),
                    text_or_null(intent.last_error.as_deref()),
                    text_or_null(intent.display_label.as_deref()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &IntentId) -> Result<Option<QueuedVoteIntent>> {
        let sql = format!("SELECT {INTENT_COLUMNS} FROM queued_votes WHERE id = ?");
        let mut intents = self.collect(&sql, vec![Value::Text(id.as_str())]).await?;
        Ok(intents.pop())
    }

    async fn list_by_status(&self, status: IntentStatus) -> Result<Vec<QueuedVoteIntent>> {
        let sql = format!("SELECT {INTENT_COLUMNS} FROM queued_votes WHERE status = ?");
        self.collect(&sql, vec![Value::Text(status.as_str().to_string())])
            .await
    }

    async fn list_all(&self) -> Result<Vec<QueuedVoteIntent>> {
        let sql = format!("SELECT {INTENT_COLUMNS} FROM queued_votes ORDER BY enqueued_at ASC, id ASC");
        self.collect(&sql, Vec::new()).await
    }

    async fn update_status(
        &self,
        id: &IntentId,
        status: IntentStatus,
        error: Option<&str>,
    ) -> Result<QueuedVoteIntent> {
        let rows = self
            .conn
            .execute(
                "UPDATE queued_votes
                 SET status = ?1,
                     last_error = COALESCE(?2, last_error),
                     retry_count = retry_count + CASE WHEN ?1 = 'syncing' THEN 1 ELSE 0 END
                 WHERE id = ?3",
                vec![
                    Value::Text(status.as_str().to_string()),
                    text_or_null(error),
                    Value::Text(id.as_str()),
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn remove(&self, id: &IntentId) -> Result<()> {
        self.conn
            .execute("DELETE FROM queued_votes WHERE id = ?", [id.as_str()])
            .await?;
        Ok(())
    }

    async fn count_by_status(&self, status: IntentStatus) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM queued_votes WHERE status = ?",
                [status.as_str()],
            )
            .await?;

        let count: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            0
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn clear_by_status(&self, status: IntentStatus) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM queued_votes WHERE status = ?",
                [status.as_str()],
            )
            .await?;
        Ok(removed)
    }

    async fn reset_status(&self, from: IntentStatus, to: IntentStatus, error: &str) -> Result<u64> {
        let moved = self
            .conn
            .execute(
                "UPDATE queued_votes SET status = ?1, last_error = ?2 WHERE status = ?3",
                [to.as_str(), error, from.as_str()],
            )
            .await?;
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::NewVoteIntent;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn intent(voter: &str, candidate: &str) -> QueuedVoteIntent {
        QueuedVoteIntent::new(NewVoteIntent::new(
            VoterKey::parse(voter).unwrap(),
            candidate,
            "9",
        ))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_get() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let queued = intent("abc1234567", "42");
        repo.insert(&queued).await.unwrap();

        let fetched = repo.get(&queued.id).await.unwrap().unwrap();
        assert_eq!(fetched, queued);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_missing_returns_none() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        assert!(repo.get(&IntentId::new()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_status_filters() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let first = intent("AAA0000001", "1");
        let second = intent("AAA0000002", "2");
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();
        repo.update_status(&second.id, IntentStatus::Failed, Some("Rejected"))
            .await
            .unwrap();

        let pending = repo.list_by_status(IntentStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);

        let failed = repo.list_by_status(IntentStatus::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("Rejected"));

        assert!(repo
            .list_by_status(IntentStatus::Syncing)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_status_counts_only_syncing_transitions() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let queued = intent("abc1234567", "42");
        repo.insert(&queued).await.unwrap();

        let updated = repo
            .update_status(&queued.id, IntentStatus::Syncing, None)
            .await
            .unwrap();
        assert_eq!(updated.retry_count, 1);

        let updated = repo
            .update_status(&queued.id, IntentStatus::Pending, Some("network down"))
            .await
            .unwrap();
        assert_eq!(updated.retry_count, 1);
        assert_eq!(updated.last_error.as_deref(), Some("network down"));

        let updated = repo
            .update_status(&queued.id, IntentStatus::Syncing, None)
            .await
            .unwrap();
        assert_eq!(updated.retry_count, 2);
        // Last error is kept when no new one is given
        assert_eq!(updated.last_error.as_deref(), Some("network down"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_status_missing_is_not_found() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let error = repo
            .update_status(&IntentId::new(), IntentStatus::Synced, None)
            .await
            .unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let queued = intent("abc1234567", "42");
        repo.insert(&queued).await.unwrap();

        repo.remove(&queued.id).await.unwrap();
        repo.remove(&queued.id).await.unwrap();
        assert!(repo.get(&queued.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_count_and_clear_by_status() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let a = intent("AAA0000001", "1");
        let b = intent("AAA0000002", "2");
        let c = intent("AAA0000003", "3");
        for queued in [&a, &b, &c] {
            repo.insert(queued).await.unwrap();
        }
        repo.update_status(&c.id, IntentStatus::Synced, None)
            .await
            .unwrap();

        assert_eq!(repo.count_by_status(IntentStatus::Pending).await.unwrap(), 2);
        assert_eq!(repo.clear_by_status(IntentStatus::Synced).await.unwrap(), 1);
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reset_status_keeps_retry_count() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let stranded = intent("AAA0000001", "1");
        let failed = intent("AAA0000002", "2");
        repo.insert(&stranded).await.unwrap();
        repo.insert(&failed).await.unwrap();
        repo.update_status(&stranded.id, IntentStatus::Syncing, None)
            .await
            .unwrap();
        repo.update_status(&failed.id, IntentStatus::Failed, Some("Rejected"))
            .await
            .unwrap();

        let moved = repo
            .reset_status(IntentStatus::Syncing, IntentStatus::Pending, "Interrupted")
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let recovered = repo.get(&stranded.id).await.unwrap().unwrap();
        assert_eq!(recovered.status, IntentStatus::Pending);
        assert_eq!(recovered.retry_count, 1);
        assert_eq!(recovered.last_error.as_deref(), Some("Interrupted"));
        let untouched = repo.get(&failed.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, IntentStatus::Failed);
    }
}
