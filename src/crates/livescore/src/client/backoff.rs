//! Reconnect backoff policy
//!
//! Delays grow exponentially from a base delay and are capped. The policy is
//! a pure value: the connection manager owns the timer that applies it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Automatic reconnects allowed after consecutive failures
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay before the first reconnect, in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Upper bound for any reconnect delay, in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Exponential backoff configuration for reconnecting the shared socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Maximum automatic reconnects before giving up
    pub max_attempts: u32,

    /// Delay before the first reconnect in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between reconnects in milliseconds
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    /// Create a policy with the given attempt ceiling and default delays
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay before reconnect number `attempt + 1` (attempt is 0-indexed)
    ///
    /// `min(base * 2^attempt, max)`, saturating instead of overflowing.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Check if another automatic reconnect is allowed after `attempts` reconnects
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// Retry bookkeeping for one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Reconnects scheduled since the last successful open
    pub attempts: u32,

    /// Last transport error description
    pub last_error: Option<String>,
}

impl RetryState {
    /// Create a new retry state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scheduled reconnect
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Record a transport error without counting an attempt
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Reset after a successful open
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_error = None;
    }
}
