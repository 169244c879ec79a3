use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use votequeue_core::sync::{HealthProbe, SyncMonitor};
use votequeue_core::SyncStatusSnapshot;

use crate::commands::common::{build_sync_context, format_sync_timestamp};
use crate::error::CliError;

/// Run the monitor until Ctrl-C, printing every status change
pub async fn run_watch(
    db_path: &Path,
    profile: Option<&str>,
    offline: bool,
) -> Result<(), CliError> {
    let context = build_sync_context(db_path, profile, offline).await?;
    let options = *context.engine.options();

    let mut probe = match context.health_url.as_deref() {
        Some(url) if !offline => Some(HealthProbe::start(
            url,
            options.poll_interval(),
            context.signal.clone(),
        )?),
        _ => None,
    };

    let mut monitor = SyncMonitor::start(
        context.engine.clone(),
        Arc::new(context.signal.clone()),
    );
    let mut status = monitor.subscribe();

    // Launch counts as gaining the foreground: drain anything already queued
    context.signal.notify_foreground();
    println!(
        "Watching queue for profile '{}' (Ctrl-C to stop)",
        context.profile_name
    );

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                println!("{}", format_watch_line(&snapshot));
            }
        }
    }

    monitor.stop().await;
    if let Some(probe) = probe.as_mut() {
        probe.stop().await;
    }
    println!("Stopped watching");
    Ok(())
}

pub fn format_watch_line(snapshot: &SyncStatusSnapshot) -> String {
    let now = format_sync_timestamp(Utc::now().timestamp_millis());
    let last_sync = snapshot
        .last_sync_time
        .map_or_else(|| "never".to_string(), format_sync_timestamp);
    let mut line = format!(
        "[{now}] pending={} syncing={} last_sync={last_sync}",
        snapshot.pending_count, snapshot.is_syncing
    );
    if let Some(error) = &snapshot.last_error {
        line.push_str(&format!(" last_error=\"{error}\""));
    }
    line
}
