//! Persisted sync scalars and confirmation receipts

use crate::error::{Error, Result};
use crate::models::{IntentId, ReceiptOutcome, SyncReceipt, VoterKey};
use libsql::{Connection, Value};

const LAST_SYNC_TIME_KEY: &str = "last_sync_time";
const LAST_ERROR_KEY: &str = "last_error";

/// Trait for sync bookkeeping that must survive restarts (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateRepository {
    /// Completion time of the last sync run (Unix ms)
    async fn last_sync_time(&self) -> Result<Option<i64>>;

    async fn set_last_sync_time(&self, timestamp_ms: i64) -> Result<()>;

    /// Joined errors of the last sync run
    async fn last_error(&self) -> Result<Option<String>>;

    /// Store the last error, or clear it with `None`
    async fn set_last_error(&self, error: Option<&str>) -> Result<()>;

    /// Record how a queued intent was confirmed
    async fn record_receipt(
        &self,
        intent_id: &IntentId,
        voter_key: &VoterKey,
        outcome: ReceiptOutcome,
        transaction_id: Option<&str>,
    ) -> Result<()>;

    /// Most recent receipts first
    async fn list_receipts(&self, limit: usize) -> Result<Vec<SyncReceipt>>;
}

/// libSQL implementation of `SyncStateRepository`
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_state WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}

impl SyncStateRepository for LibSqlSyncStateRepository<'_> {
    async fn last_sync_time(&self) -> Result<Option<i64>> {
        // A garbled value reads as "never synced" rather than failing the snapshot
        Ok(self
            .get_value(LAST_SYNC_TIME_KEY)
            .await?
            .and_then(|value| value.parse().ok()))
    }

    async fn set_last_sync_time(&self, timestamp_ms: i64) -> Result<()> {
        self.set_value(LAST_SYNC_TIME_KEY, &timestamp_ms.to_string())
            .await
    }

    async fn last_error(&self) -> Result<Option<String>> {
        self.get_value(LAST_ERROR_KEY).await
    }

    async fn set_last_error(&self, error: Option<&str>) -> Result<()> {
        match error {
            Some(error) => self.set_value(LAST_ERROR_KEY, error).await,
            None => self.delete_value(LAST_ERROR_KEY).await,
        }
    }

    async fn record_receipt(
        &self,
        intent_id: &IntentId,
        voter_key: &VoterKey,
        outcome: ReceiptOutcome,
        transaction_id: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_receipts (intent_id, voter_key, outcome, transaction_id, resolved_at)
                 VALUES (?, ?, ?, ?, ?)",
                vec![
                    Value::Text(intent_id.as_str()),
                    Value::Text(voter_key.to_string()),
                    Value::Text(outcome.as_str().to_string()),
                    transaction_id.map_or(Value::Null, |tx| Value::Text(tx.to_string())),
                    Value::Integer(crate::util::now_millis()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_receipts(&self, limit: usize) -> Result<Vec<SyncReceipt>> {
        let limit = i64::try_from(limit)
            .map_err(|_| Error::InvalidInput("Receipt limit is too large".into()))?;

        let mut rows = self
            .conn
            .query(
                "SELECT id, intent_id, voter_key, outcome, transaction_id, resolved_at
                 FROM sync_receipts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                [limit],
            )
            .await?;

        let mut receipts = Vec::new();
        while let Some(row) = rows.next().await? {
            let outcome: String = row.get(3)?;
            receipts.push(SyncReceipt {
                id: row.get(0)?,
                intent_id: row.get(1)?,
                voter_key: row.get(2)?,
                outcome: outcome.parse()?,
                transaction_id: row.get(4)?,
                resolved_at: row.get(5)?,
            });
        }
        Ok(receipts)
    }
}
