//! Sync run result and status snapshot models

use serde::{Deserialize, Serialize};

/// Point-in-time view of the queue for UI consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusSnapshot {
    /// A sync run is in progress right now
    pub is_syncing: bool,
    /// Intents still waiting in `pending`
    pub pending_count: usize,
    /// Completion time of the last run (Unix ms), persisted across restarts
    pub last_sync_time: Option<i64>,
    /// Joined errors of the last run, persisted across restarts
    pub last_error: Option<String>,
}

/// Outcome of one `run_sync` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Result for a run that did nothing
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            success_count: 0,
            failed_count: 0,
            errors: Vec::new(),
        }
    }

    /// Result for a run refused before touching the queue
    #[must_use]
    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            errors: vec![reason.into()],
            ..Self::empty()
        }
    }

    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.success_count == 0 && self.failed_count == 0 && self.errors.is_empty()
    }

    /// Errors joined the way they are persisted as `last_error`
    #[must_use]
    pub fn joined_errors(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_noop() {
        assert!(SyncReport::empty().is_noop());
        assert!(!SyncReport::refused("Device is offline").is_noop());
    }

    #[test]
    fn test_joined_errors() {
        let report = SyncReport {
            success_count: 0,
            failed_count: 2,
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(report.joined_errors().as_deref(), Some("a; b"));
        assert_eq!(SyncReport::empty().joined_errors(), None);
    }
}
