//! Timeout enforcement.
//!
//! # Responsibilities
//! - Track the whole-request deadline
//! - Derive each attempt's timeout from it
//!
//! # Design Decisions
//! - Uses Tokio's clock so paused-time tests drive it
//! - An attempt never outlives the request deadline
//! - Timed-out requests return 504 Gateway Timeout

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self::starting_at(Instant::now(), budget)
    }

    pub fn starting_at(start: Instant, budget: Duration) -> Self {
        Self { at: start + budget }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// `min(per_attempt, remaining)`, or `None` once the deadline passed.
    pub fn attempt_timeout(&self, per_attempt: Duration) -> Option<Duration> {
        let remaining = self.remaining();
        (!remaining.is_zero()).then(|| per_attempt.min(remaining))
    }
}

/// Whole seconds, rounded up, at least one. Used for Retry-After hints.
pub fn round_up_secs(d: Duration) -> Duration {
    let whole = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    Duration::from_secs(whole.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_shrinks_with_deadline() {
        let deadline = Deadline::after(Duration::from_secs(30));
        assert_eq!(
            deadline.attempt_timeout(Duration::from_secs(10)),
            Some(Duration::from_secs(10))
        );

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(
            deadline.attempt_timeout(Duration::from_secs(10)),
            Some(Duration::from_secs(5))
        );

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.attempt_timeout(Duration::from_secs(10)), None);
    }

    #[test]
    fn retry_hints_round_up() {
        assert_eq!(round_up_secs(Duration::from_millis(1)), Duration::from_secs(1));
        assert_eq!(round_up_secs(Duration::from_millis(2_001)), Duration::from_secs(3));
        assert_eq!(round_up_secs(Duration::ZERO), Duration::from_secs(1));
    }
}
