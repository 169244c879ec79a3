use std::path::Path;

use crate::commands::common::{build_sync_context, format_report_lines};
use crate::error::CliError;

pub async fn run_sync(
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
    offline: bool,
) -> Result<(), CliError> {
    let context = build_sync_context(db_path, profile, offline).await?;
    let report = context.engine.run_sync().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}
