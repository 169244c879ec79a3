//! Tunables for the sync engine and monitor

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INTER_ITEM_DELAY_MS: u64 = 1_000;
const DEFAULT_SETTLE_DELAY_MS: u64 = 2_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Retry ceiling and timing used while draining the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Number of `syncing` transitions after which a transient failure becomes terminal
    pub max_attempts: u32,
    /// Pause after each successful submission before the next intent
    pub inter_item_delay_ms: u64,
    /// Wait after coming back online before syncing
    pub settle_delay_ms: u64,
    /// How often the monitor refreshes the published snapshot
    pub poll_interval_ms: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            inter_item_delay_ms: DEFAULT_INTER_ITEM_DELAY_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SyncOptions {
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        // Zero would fail intents without ever submitting them
        self.max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        self
    }

    #[must_use]
    pub const fn with_inter_item_delay(mut self, delay: Duration) -> Self {
        self.inter_item_delay_ms = duration_ms(delay);
        self
    }

    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = duration_ms(delay);
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    pub const fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Poll interval, never shorter than 100ms
    pub const fn poll_interval(&self) -> Duration {
        let ms = if self.poll_interval_ms < 100 {
            100
        } else {
            self.poll_interval_ms
        };
        Duration::from_millis(ms)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(duration: Duration) -> u64 {
    let ms = duration.as_millis();
    if ms > u64::MAX as u128 {
        u64::MAX
    } else {
        ms as u64
    }
}
