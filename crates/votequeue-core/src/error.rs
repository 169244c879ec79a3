//! Error types for votequeue-core

use thiserror::Error;

use crate::ledger::LedgerError;

/// Result type alias using votequeue-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in votequeue-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Queued intent not found
    #[error("Queued vote not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The queue backend could not be opened; every operation reports the same cause
    #[error("Vote queue storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Ledger call failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Error {
    /// Whether this is the "record already gone" condition callers may ignore.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
