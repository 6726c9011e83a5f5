//! Exponential backoff for batch retries
//!
//! Delay before retry `n` (0-based) is `base_delay × 2^n`, capped at
//! `max_delay`. A batch gets at most `max_attempts` attempts in total.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts per batch, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before the `retry`-th retry (0 = first retry)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        2u32.checked_pow(retry)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}
