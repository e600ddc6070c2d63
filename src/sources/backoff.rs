//! Exponential backoff for push re-subscription.

use std::time::Duration;

/// Doubling delay, starting at the base and capped at the maximum.
///
/// Delays run 1s, 2s, 4s, 8s, ... with the default base.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    /// Backoff with a 1s base delay.
    pub fn new(max_delay: Duration) -> Self {
        Self::with_config(Duration::from_secs(1), max_delay)
    }

    pub fn with_config(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            attempts: 0,
        }
    }

    /// Record an attempt and return the delay to wait before it.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempts.min(31);
        self.attempts = self.attempts.saturating_add(1);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
