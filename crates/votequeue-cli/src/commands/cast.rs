use std::path::Path;

use serde::Serialize;
use votequeue_core::ledger::LedgerError;
use votequeue_core::models::ballot_problem;
use votequeue_core::CastOutcome;

use crate::cli::BallotArgs;
use crate::commands::common::{build_new_intent, build_sync_context, open_queue};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct CastItem {
    pub queued: bool,
    pub transaction_id: Option<String>,
    pub intent_id: Option<String>,
    pub reason: Option<String>,
}

impl From<&CastOutcome> for CastItem {
    fn from(outcome: &CastOutcome) -> Self {
        match outcome {
            CastOutcome::Submitted { transaction_id } => Self {
                queued: false,
                transaction_id: Some(transaction_id.clone()),
                intent_id: None,
                reason: None,
            },
            CastOutcome::Queued { intent_id, reason } => Self {
                queued: true,
                transaction_id: None,
                intent_id: Some(intent_id.to_string()),
                reason: Some(reason.clone()),
            },
        }
    }
}

pub async fn run_cast(
    ballot: &BallotArgs,
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
    offline: bool,
) -> Result<(), CliError> {
    let intent = build_new_intent(ballot)?;
    let context = build_sync_context(db_path, profile, offline).await?;
    let outcome = context.engine.cast_vote_or_queue(intent).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&CastItem::from(&outcome))?);
        return Ok(());
    }

    match outcome {
        CastOutcome::Submitted { transaction_id } => {
            println!("Vote submitted: {transaction_id}");
        }
        CastOutcome::Queued { intent_id, reason } => {
            println!(
                "Vote queued as {intent_id} ({reason}); it will sync when the ledger is reachable"
            );
        }
    }
    Ok(())
}

/// Store a vote for later sync without contacting the ledger
pub async fn run_enqueue(
    ballot: &BallotArgs,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let intent = build_new_intent(ballot)?;
    if let Some(problem) = ballot_problem(&intent.ballot()) {
        return Err(LedgerError::InvalidParameters(problem).into());
    }

    let queue = open_queue(db_path).await?;
    let intent_id = queue.enqueue(intent).await?;

    if as_json {
        let item = CastItem {
            queued: true,
            transaction_id: None,
            intent_id: Some(intent_id.to_string()),
            reason: None,
        };
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("{intent_id}");
    }
    Ok(())
}
