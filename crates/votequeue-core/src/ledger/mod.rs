//! Ledger boundary: the capability the sync engine submits votes through.
//!
//! The ledger itself (a voting contract reached through a wallet-style signer)
//! lives outside this crate. `LedgerClient` is the contract the core relies on;
//! `HttpLedgerClient` reaches it through a JSON gateway.

mod http;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{VoteBallot, VoterKey};

pub use http::{HttpLedgerClient, LedgerGatewayConfig};

/// Failure reported by the ledger boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The signer declined to authorize the transaction
    #[error("Transaction rejected by signer")]
    Rejected,
    /// The ledger already holds a vote for this voter
    #[error("Voter has already voted")]
    AlreadyVoted,
    /// Malformed candidate or ward selection
    #[error("Invalid vote parameters: {0}")]
    InvalidParameters(String),
    /// Signer, network or ledger cannot be reached right now
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    #[error("Ledger error: {0}")]
    Unknown(String),
}

/// What a failed submission means for the queued intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying on a later run (until the retry ceiling)
    Transient,
    /// Retrying cannot help
    Permanent,
    /// The voter's vote is on the ledger; treat as success
    AlreadyRecorded,
}

impl LedgerError {
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Unavailable(_) | Self::Unknown(_) => FailureClass::Transient,
            Self::Rejected | Self::InvalidParameters(_) => FailureClass::Permanent,
            Self::AlreadyVoted => FailureClass::AlreadyRecorded,
        }
    }

    /// Whether a direct cast hitting this error should fall back to the queue
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Required capability of the external ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Whether a transaction signer is configured and usable
    fn signer_available(&self) -> bool;

    /// Whether the ledger already holds a vote for this voter
    async fn has_already_voted(&self, voter_key: &VoterKey) -> Result<bool, LedgerError>;

    /// Submit a vote, returning the ledger transaction id
    async fn submit_vote(&self, ballot: &VoteBallot) -> Result<String, LedgerError>;
}
