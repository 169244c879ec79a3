use std::path::Path;

use votequeue_core::IntentStatus;

use crate::commands::common::{
    format_intent_detail, format_intent_lines, intent_to_list_item, open_queue, resolve_intent,
    IntentListItem,
};
use crate::error::CliError;

pub async fn run_list(
    status: Option<IntentStatus>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let queue = open_queue(db_path).await?;
    let mut intents = match status {
        Some(status) => queue.list_by_status(status).await?,
        None => queue.list_all().await?,
    };
    intents.sort_by(|a, b| {
        a.enqueued_at
            .cmp(&b.enqueued_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    if as_json {
        let json_items = intents
            .iter()
            .map(intent_to_list_item)
            .collect::<Vec<IntentListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if intents.is_empty() {
        println!("No queued votes.");
    } else {
        for line in format_intent_lines(&intents) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let queue = open_queue(db_path).await?;
    let intent = resolve_intent(id, &queue).await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&intent_to_list_item(&intent))?
        );
    } else {
        for line in format_intent_detail(&intent) {
            println!("{line}");
        }
    }
    Ok(())
}
