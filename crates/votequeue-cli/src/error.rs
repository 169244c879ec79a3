use std::io;

use thiserror::Error;
use votequeue_core::ledger::LedgerError;

use crate::signer::SignerError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] votequeue_core::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Queued vote ID cannot be empty")]
    EmptyIntentId,
    #[error("Queued vote not found for id/prefix: {0}")]
    IntentNotFound(String),
    #[error("{0}")]
    AmbiguousIntentId(String),
    #[error("Queued vote {0} is being synced right now; try again later")]
    IntentInFlight(String),
    #[error("No signer token provided")]
    EmptySignerToken,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Ledger gateway is not configured. Run `votequeue config init --ledger-url <URL>` or set VOTEQUEUE_LEDGER_URL."
    )]
    LedgerNotConfigured,
}
