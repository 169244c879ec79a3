//! Sync receipt model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How a queued intent came to be confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptOutcome {
    /// This client submitted the vote and got a transaction id back
    Submitted,
    /// The ledger already had a vote for this voter; no local transaction id
    AlreadyRecorded,
}

impl ReceiptOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::AlreadyRecorded => "already_recorded",
        }
    }
}

impl fmt::Display for ReceiptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "already_recorded" => Ok(Self::AlreadyRecorded),
            other => Err(Error::InvalidInput(format!(
                "Unknown receipt outcome: {other}"
            ))),
        }
    }
}

/// Audit record written when a queued intent reaches `synced`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReceipt {
    /// Receipt row identifier
    pub id: i64,
    /// Intent that was confirmed (the intent row itself is deleted)
    pub intent_id: String,
    pub voter_key: String,
    pub outcome: ReceiptOutcome,
    /// Present only for `Submitted`
    pub transaction_id: Option<String>,
    /// Confirmation timestamp (unix ms)
    pub resolved_at: i64,
}
