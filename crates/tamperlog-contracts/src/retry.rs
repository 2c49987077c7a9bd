//! Retry and backoff policy for the append engine.

use std::time::Duration;

/// Bounds on how hard the append engine retries before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed when racing for a sequence before `ChainConflict`.
    pub max_append_attempts: u32,
    /// Retries allowed on transient storage failures before `TransientStorage`.
    pub max_transient_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped at `backoff_max`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_append_attempts: 8,
            max_transient_retries: 5,
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_millis(500),
        }
    }
}
