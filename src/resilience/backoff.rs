//! Exponential backoff with jitter, bounded by the request deadline.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay schedule between upstream attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base) }
    }

    /// Sleep before retry number `retry` (1-based).
    ///
    /// Doubles from `base` up to `max`, then adds up to 10% jitter. The
    /// result never exceeds `remaining`, jitter included.
    pub fn delay(&self, retry: u32, remaining: Duration) -> Duration {
        if retry == 0 || remaining.is_zero() {
            return Duration::ZERO;
        }
        let doubled = self
            .base
            .checked_mul(1u32.checked_shl(retry - 1).unwrap_or(u32::MAX))
            .unwrap_or(self.max);
        let delay = doubled.min(self.max).min(remaining);

        let spread = (delay / 10).min(remaining - delay);
        if spread.is_zero() {
            return delay;
        }
        delay + spread.mul_f64(rand::thread_rng().gen::<f64>())
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}
