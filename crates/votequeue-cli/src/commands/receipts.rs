use std::path::Path;

use crate::commands::common::{format_receipt_lines, open_queue, receipt_to_item, ReceiptItem};
use crate::error::CliError;

pub async fn run_receipts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let queue = open_queue(db_path).await?;
    let receipts = queue.list_receipts(limit).await?;

    if as_json {
        let json_items = receipts
            .iter()
            .map(receipt_to_item)
            .collect::<Vec<ReceiptItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if receipts.is_empty() {
        println!("No sync receipts recorded.");
        return Ok(());
    }

    for line in format_receipt_lines(&receipts) {
        println!("{line}");
    }
    Ok(())
}
