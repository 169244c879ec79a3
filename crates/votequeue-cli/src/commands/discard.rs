use std::path::Path;

use votequeue_core::{IntentStatus, QueueService};

use crate::commands::common::{open_queue, resolve_intent, short_id};
use crate::error::CliError;

pub async fn run_discard(id: &str, db_path: &Path) -> Result<(), CliError> {
    let queue = open_queue(db_path).await?;
    let removed = discard_intent(id, &queue).await?;
    println!("Discarded queued vote {removed}");
    Ok(())
}

/// Remove a queued vote unless a sync run currently owns it
pub async fn discard_intent(id: &str, queue: &QueueService) -> Result<String, CliError> {
    let intent = resolve_intent(id, queue).await?;
    if intent.status == IntentStatus::Syncing {
        return Err(CliError::IntentInFlight(short_id(&intent.id)));
    }

    queue.remove(&intent.id).await?;
    tracing::info!(
        "Discarded {} vote {} for voter {}",
        intent.status,
        intent.id,
        intent.voter_key
    );
    Ok(intent.id.to_string())
}
