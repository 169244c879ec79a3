use std::path::Path;

use crate::commands::common::open_queue;
use crate::error::CliError;

pub async fn run_purge(db_path: &Path) -> Result<(), CliError> {
    let queue = open_queue(db_path).await?;
    let removed = queue.clear_synced().await?;
    println!("Removed {removed} synced vote(s)");
    Ok(())
}
