use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use votequeue_core::ledger::{HttpLedgerClient, LedgerGatewayConfig};
use votequeue_core::models::{SyncReceipt, SyncReport};
use votequeue_core::sync::{check_health, ConnectivitySignal};
use votequeue_core::{
    IntentId, NewVoteIntent, QueueService, QueuedVoteIntent, SyncEngine, SyncStatusSnapshot,
    VoterKey,
};

use crate::cli::BallotArgs;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;
use crate::signer::resolve_signer_token;

pub const DB_PATH_ENV_VAR: &str = "VOTEQUEUE_DB_PATH";
const SHORT_ID_LEN: usize = 18;
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct IntentListItem {
    pub id: String,
    pub voter_key: String,
    pub candidate: String,
    pub candidate_label: Option<String>,
    pub ward: String,
    pub status: String,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub enqueued_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct ReceiptItem {
    pub id: i64,
    pub intent_id: String,
    pub voter_key: String,
    pub outcome: String,
    pub transaction_id: Option<String>,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
}

/// Everything a command needs to talk to the ledger
pub struct SyncContext {
    pub engine: SyncEngine,
    pub signal: ConnectivitySignal,
    pub health_url: Option<String>,
    pub profile_name: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("votequeue")
        .join("queue.db")
}

pub async fn open_queue(path: &Path) -> Result<QueueService, CliError> {
    Ok(QueueService::open_path(path.to_path_buf()).await?)
}

pub fn build_new_intent(ballot: &BallotArgs) -> Result<NewVoteIntent, CliError> {
    let voter_key = VoterKey::parse(&ballot.voter)?;
    let mut intent = NewVoteIntent::new(
        voter_key,
        ballot.candidate.trim(),
        ballot.ward.trim(),
    );
    if let Some(label) = &ballot.label {
        intent = intent.with_display_label(label.clone());
    }
    Ok(intent)
}

pub fn normalize_intent_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyIntentId)
    } else {
        Ok(trimmed.to_lowercase())
    }
}

/// Find a queued vote by full id or unique id prefix
pub async fn resolve_intent(query: &str, queue: &QueueService) -> Result<QueuedVoteIntent, CliError> {
    let query = normalize_intent_identifier(query)?;

    if let Ok(intent_id) = query.parse::<IntentId>() {
        if let Some(intent) = queue.get(&intent_id).await? {
            return Ok(intent);
        }
    }

    let mut matching = queue
        .list_all()
        .await?
        .into_iter()
        .filter(|intent| intent.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::IntentNotFound(query)),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|intent| short_id(&intent.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousIntentId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &IntentId) -> String {
    id.as_str().chars().take(SHORT_ID_LEN).collect()
}

pub fn format_intent_lines(intents: &[QueuedVoteIntent]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    intents
        .iter()
        .map(|intent| {
            let relative_time = format_relative_time(intent.enqueued_at, now_ms);
            let line = format!(
                "{:<18}  {:<8}  {:<14}  {:<20}  ward={:<6}  tries={}  {}",
                short_id(&intent.id),
                intent.status.as_str(),
                intent.voter_key.as_str(),
                intent.candidate_label(),
                intent.ward_selection,
                intent.retry_count,
                relative_time
            );
            match &intent.last_error {
                Some(error) => format!("{line}  ({error})"),
                None => line,
            }
        })
        .collect()
}

pub fn format_intent_detail(intent: &QueuedVoteIntent) -> Vec<String> {
    let mut lines = vec![
        format!("ID:         {}", intent.id),
        format!("Voter:      {}", intent.voter_key),
        format!("Candidate:  {}", intent.candidate_selection),
    ];
    if let Some(label) = &intent.display_label {
        lines.push(format!("Label:      {label}"));
    }
    lines.push(format!("Ward:       {}", intent.ward_selection));
    lines.push(format!("Status:     {}", intent.status));
    lines.push(format!("Attempts:   {}", intent.retry_count));
    lines.push(format!(
        "Queued:     {}",
        format_sync_timestamp(intent.enqueued_at)
    ));
    if let Some(error) = &intent.last_error {
        lines.push(format!("Last error: {error}"));
    }
    lines
}

pub fn intent_to_list_item(intent: &QueuedVoteIntent) -> IntentListItem {
    let now_ms = Utc::now().timestamp_millis();
    IntentListItem {
        id: intent.id.to_string(),
        voter_key: intent.voter_key.to_string(),
        candidate: intent.candidate_selection.clone(),
        candidate_label: intent.display_label.clone(),
        ward: intent.ward_selection.clone(),
        status: intent.status.to_string(),
        retry_count: intent.retry_count,
        last_error: intent.last_error.clone(),
        enqueued_at: intent.enqueued_at,
        relative_time: format_relative_time(intent.enqueued_at, now_ms),
    }
}

pub fn receipt_to_item(receipt: &SyncReceipt) -> ReceiptItem {
    ReceiptItem {
        id: receipt.id,
        intent_id: receipt.intent_id.clone(),
        voter_key: receipt.voter_key.clone(),
        outcome: receipt.outcome.to_string(),
        transaction_id: receipt.transaction_id.clone(),
        resolved_at: receipt.resolved_at,
        resolved_at_iso: format_sync_timestamp(receipt.resolved_at),
    }
}

pub fn format_receipt_lines(receipts: &[SyncReceipt]) -> Vec<String> {
    receipts
        .iter()
        .map(|receipt| {
            format!(
                "{}  {:<16}  voter={}  vote={}  tx={}",
                format_sync_timestamp(receipt.resolved_at),
                receipt.outcome.as_str(),
                receipt.voter_key,
                receipt.intent_id,
                receipt.transaction_id.as_deref().unwrap_or("-")
            )
        })
        .collect()
}

pub fn format_status_lines(snapshot: &SyncStatusSnapshot) -> Vec<String> {
    let last_sync = snapshot.last_sync_time.map_or_else(
        || "never".to_string(),
        |time| {
            format!(
                "{} ({})",
                format_sync_timestamp(time),
                format_relative_time(time, Utc::now().timestamp_millis())
            )
        },
    );
    let mut lines = vec![
        format!("Pending votes: {}", snapshot.pending_count),
        format!("Syncing:       {}", if snapshot.is_syncing { "yes" } else { "no" }),
        format!("Last sync:     {last_sync}"),
    ];
    if let Some(error) = &snapshot.last_error {
        lines.push(format!("Last error:    {error}"));
    }
    lines
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Synced {} vote(s), {} failed",
        report.success_count, report.failed_count
    )];
    lines.extend(report.errors.iter().map(|error| format!("  - {error}")));
    lines
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn load_profile(explicit: Option<&str>) -> Result<(String, CliProfile), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(explicit);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();
    Ok((profile_name, profile))
}

/// Wire queue, ledger gateway and connectivity into a sync engine.
///
/// Connectivity is a one-shot health check unless `offline` is set. Storage
/// that cannot be opened yields a degraded queue, so a vote the ledger accepts
/// directly still goes through.
pub async fn build_sync_context(
    db_path: &Path,
    profile_override: Option<&str>,
    offline: bool,
) -> Result<SyncContext, CliError> {
    let (profile_name, profile) = load_profile(profile_override)?;
    let ledger_url = profile.ledger_url().ok_or(CliError::LedgerNotConfigured)?;
    let signer_token = resolve_signer_token(&profile_name)?.map(|(token, _)| token);
    if signer_token.is_none() {
        tracing::warn!("No signer token for profile '{profile_name}'; votes will stay queued");
    }

    let ledger = HttpLedgerClient::new(
        LedgerGatewayConfig::new(ledger_url).with_signer_token(signer_token),
    )?;
    let health_url = profile.health_url();
    let online = if offline {
        false
    } else if let Some(url) = health_url.as_deref() {
        check_health(url, HEALTH_CHECK_TIMEOUT).await
    } else {
        true
    };
    tracing::debug!("Ledger gateway reachable: {online}");

    let queue = QueueService::open_path_or_degraded(db_path).await;
    let signal = ConnectivitySignal::new(online);
    let engine = SyncEngine::new(
        queue,
        Arc::new(ledger),
        Arc::new(signal.clone()),
        profile.sync_options(),
    );

    Ok(SyncContext {
        engine,
        signal,
        health_url,
        profile_name,
    })
}
