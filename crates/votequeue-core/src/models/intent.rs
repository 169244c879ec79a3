//! Queued vote intent model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A unique identifier for a queued intent, using UUID v7 (time-sortable with a random tail)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentId(Uuid);

impl IntentId {
    /// Create a new unique intent ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IntentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Canonical voter registration number (trimmed, uppercase)
///
/// Every comparison and every ledger lookup goes through this form, so
/// `" abc1234567"` and `"ABC1234567"` are the same voter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoterKey(String);

impl VoterKey {
    /// Canonicalize a raw registration number
    pub fn parse(raw: &str) -> Result<Self> {
        let canonical = raw.trim().to_uppercase();
        if canonical.is_empty() {
            return Err(Error::InvalidInput(
                "Voter registration number cannot be empty".into(),
            ));
        }
        if canonical.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!(
                "Voter registration number must not contain whitespace: {canonical}"
            )));
        }
        Ok(Self(canonical))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VoterKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VoterKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<VoterKey> for String {
    fn from(value: VoterKey) -> Self {
        value.0
    }
}

/// Lifecycle status of a queued intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    /// Waiting for the next sync run
    Pending,
    /// Currently being submitted
    Syncing,
    /// Confirmed on the ledger (rows in this state are normally deleted right away)
    Synced,
    /// Gave up; retained for operator attention
    Failed,
}

impl IntentStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Syncing, Self::Synced, Self::Failed];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    /// Whether automatic sync will never touch an intent in this state again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Synced | Self::Failed)
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("Unknown intent status: {other}"))),
        }
    }
}

/// What the ledger needs to record one vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteBallot {
    pub voter_key: VoterKey,
    pub candidate_selection: String,
    pub ward_selection: String,
}

/// A vote intent before it has been assigned an id and queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVoteIntent {
    pub voter_key: VoterKey,
    pub candidate_selection: String,
    pub ward_selection: String,
    pub display_label: Option<String>,
}

impl NewVoteIntent {
    #[must_use]
    pub fn new(
        voter_key: VoterKey,
        candidate_selection: impl Into<String>,
        ward_selection: impl Into<String>,
    ) -> Self {
        Self {
            voter_key,
            candidate_selection: candidate_selection.into(),
            ward_selection: ward_selection.into(),
            display_label: None,
        }
    }

    /// Attach a human-readable candidate name (display only)
    #[must_use]
    pub fn with_display_label(mut self, label: impl Into<String>) -> Self {
        self.display_label = crate::util::normalize_text_option(Some(label.into()));
        self
    }

    pub fn ballot(&self) -> VoteBallot {
        VoteBallot {
            voter_key: self.voter_key.clone(),
            candidate_selection: self.candidate_selection.clone(),
            ward_selection: self.ward_selection.clone(),
        }
    }
}

impl From<VoteBallot> for NewVoteIntent {
    fn from(ballot: VoteBallot) -> Self {
        Self::new(
            ballot.voter_key,
            ballot.candidate_selection,
            ballot.ward_selection,
        )
    }
}

/// A voter's not-yet-confirmed ballot held in the durable queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedVoteIntent {
    /// Unique identifier
    pub id: IntentId,
    /// Canonical voter registration number
    pub voter_key: VoterKey,
    /// Candidate identifier or the none-of-the-above sentinel
    pub candidate_selection: String,
    /// Electoral subdivision identifier
    pub ward_selection: String,
    /// Creation timestamp (Unix ms)
    pub enqueued_at: i64,
    pub status: IntentStatus,
    /// Number of transitions into `syncing`
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub display_label: Option<String>,
}

impl QueuedVoteIntent {
    /// Materialize a fresh pending intent
    #[must_use]
    pub fn new(intent: NewVoteIntent) -> Self {
        Self {
            id: IntentId::new(),
            voter_key: intent.voter_key,
            candidate_selection: intent.candidate_selection,
            ward_selection: intent.ward_selection,
            enqueued_at: crate::util::now_millis(),
            status: IntentStatus::Pending,
            retry_count: 0,
            last_error: None,
            display_label: intent.display_label,
        }
    }

    #[must_use]
    pub fn ballot(&self) -> VoteBallot {
        VoteBallot {
            voter_key: self.voter_key.clone(),
            candidate_selection: self.candidate_selection.clone(),
            ward_selection: self.ward_selection.clone(),
        }
    }

    /// Label for listings: display label if any, otherwise the raw selection
    #[must_use]
    pub fn candidate_label(&self) -> &str {
        self.display_label
            .as_deref()
            .unwrap_or(&self.candidate_selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_id_unique() {
        let id1 = IntentId::new();
        let id2 = IntentId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_intent_id_parse() {
        let id = IntentId::new();
        let parsed: IntentId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_intent_ids_sort_by_creation() {
        let first = IntentId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = IntentId::new();
        assert!(first < second);
    }

    #[test]
    fn test_voter_key_canonicalizes() {
        let key = VoterKey::parse("  abc1234567 ").unwrap();
        assert_eq!(key.as_str(), "ABC1234567");
        assert_eq!(key, VoterKey::parse("ABC1234567").unwrap());
    }

    #[test]
    fn test_voter_key_rejects_empty_and_inner_whitespace() {
        assert!(VoterKey::parse("   ").is_err());
        assert!(VoterKey::parse("ABC 123").is_err());
    }

    #[test]
    fn test_voter_key_serde_canonicalizes() {
        let key: VoterKey = serde_json::from_str("\"xyz0001\"").unwrap();
        assert_eq!(key.as_str(), "XYZ0001");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"XYZ0001\"");
    }

    #[test]
    fn test_status_roundtrip_and_terminal() {
        for status in IntentStatus::ALL {
            assert_eq!(status.as_str().parse::<IntentStatus>().unwrap(), status);
        }
        assert!("done".parse::<IntentStatus>().is_err());
        assert!(IntentStatus::Failed.is_terminal());
        assert!(!IntentStatus::Pending.is_terminal());
    }

    #[test]
    fn test_queued_intent_new_defaults() {
        let key = VoterKey::parse("abc1234567").unwrap();
        let intent = QueuedVoteIntent::new(
            NewVoteIntent::new(key.clone(), "42", "9").with_display_label("  Asha  "),
        );
        assert_eq!(intent.status, IntentStatus::Pending);
        assert_eq!(intent.retry_count, 0);
        let before = crate::util::now_millis();
        let timed = QueuedVoteIntent::new(NewVoteIntent::new(key.clone(), "1", "1"));
        assert!(timed.enqueued_at >= before);
        assert!(timed.enqueued_at <= crate::util::now_millis());
        assert!(intent.last_error.is_none());
        assert_eq!(intent.display_label.as_deref(), Some("Asha"));
        assert_eq!(intent.candidate_label(), "Asha");
        assert_eq!(intent.ballot().voter_key, key);
    }
}
