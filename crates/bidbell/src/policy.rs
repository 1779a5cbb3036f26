//! Reconnect policy: linear backoff with a bounded attempt budget.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maps a reconnect attempt number to a delay and decides when to give up.
///
/// `attempt` is the number of consecutive failed connections, so it is
/// 1-based for both [`next_delay`](Self::next_delay) and
/// [`should_retry`](Self::should_retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay unit; attempt `n` waits `n * base_delay_ms`
    pub base_delay_ms: u64,
    /// Upper bound on a single delay (0 = unbounded)
    pub max_delay_ms: u64,
    /// Reconnect attempts allowed before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay_ms: u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX),
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay before reconnect attempt `attempt`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let ms = self.base_delay_ms.saturating_mul(u64::from(attempt));
        if self.max_delay_ms > 0 {
            Duration::from_millis(ms.min(self.max_delay_ms))
        } else {
            Duration::from_millis(ms)
        }
    }

    /// Whether to reconnect after `attempt` consecutive failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
