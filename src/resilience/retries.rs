//! Retry logic.
//!
//! # Responsibilities
//! - Determine if request is retryable (idempotent methods only)
//! - Compute the attempt budget and backoff between attempts
//!
//! # Design Decisions
//! - Never retry POST/PATCH unless the service opts in
//! - Jittered backoff prevents thundering herd
//! - Connection errors, timeouts and 5xx are retryable; 4xx never are

use std::time::Duration;

use axum::http::Method;

use crate::config::RetryConfig;
use crate::resilience::backoff::Backoff;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    enabled: bool,
    max_attempts: u32,
    backoff: Backoff,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::from(config),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Attempts allowed for `method`, the first one included.
    pub fn attempts_for(&self, method: &Method, allow_non_idempotent: bool) -> u32 {
        if self.enabled && is_retryable(method, allow_non_idempotent) {
            self.max_attempts
        } else {
            1
        }
    }

    /// Sleep before attempt `attempt + 1`, bounded by the time left.
    pub fn delay_after(&self, attempt: u32, remaining: Duration) -> Duration {
        self.backoff.delay(attempt, remaining)
    }
}

pub fn is_retryable(method: &Method, allow_non_idempotent: bool) -> bool {
    method.is_idempotent() || allow_non_idempotent
}
