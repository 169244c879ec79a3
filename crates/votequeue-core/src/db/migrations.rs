//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Apply a batch of statements atomically.
///
/// libsql doesn't have execute_batch, so each statement runs separately inside
/// one transaction.
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version} (latest {CURRENT_VERSION})");
    Ok(())
}

/// Migration to version 1: vote queue and persisted sync scalars
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Queued vote intents
        "CREATE TABLE IF NOT EXISTS queued_votes (
            id TEXT PRIMARY KEY,
            voter_key TEXT NOT NULL,
            candidate_selection TEXT NOT NULL,
            ward_selection TEXT NOT NULL,
            enqueued_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'syncing', 'synced', 'failed')),
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            display_label TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_queued_votes_status ON queued_votes(status)",
        "CREATE INDEX IF NOT EXISTS idx_queued_votes_enqueued ON queued_votes(enqueued_at)",
        "CREATE INDEX IF NOT EXISTS idx_queued_votes_voter ON queued_votes(voter_key)",
        // Small scalars that must survive restarts (last sync time, last error)
        "CREATE TABLE IF NOT EXISTS sync_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    ];

    apply(conn, 1, &statements).await
}

/// Migration to version 2: confirmation receipts
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS sync_receipts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            intent_id TEXT NOT NULL,
            voter_key TEXT NOT NULL,
            outcome TEXT NOT NULL CHECK (outcome IN ('submitted', 'already_recorded')),
            transaction_id TEXT,
            resolved_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_receipts_resolved_at ON sync_receipts(resolved_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_sync_receipts_voter ON sync_receipts(voter_key)",
    ];

    apply(conn, 2, &statements).await
}
