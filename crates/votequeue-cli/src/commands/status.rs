use std::path::Path;

use votequeue_core::SyncStatusSnapshot;

use crate::commands::common::{format_status_lines, open_queue};
use crate::error::CliError;

/// Persisted status; a one-shot process is never mid-run
pub async fn load_status(db_path: &Path) -> Result<SyncStatusSnapshot, CliError> {
    let queue = open_queue(db_path).await?;
    Ok(SyncStatusSnapshot {
        is_syncing: false,
        pending_count: queue.count_pending().await?,
        last_sync_time: queue.last_sync_time().await?,
        last_error: queue.last_error().await?,
    })
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let snapshot = load_status(db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for line in format_status_lines(&snapshot) {
            println!("{line}");
        }
    }
    Ok(())
}
