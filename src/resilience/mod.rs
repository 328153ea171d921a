//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (admit or fail fast)
//!     → timeouts.rs (attempt timeout within the request deadline)
//!     → On failure: retries.rs (check if retryable, wait with backoff.rs)
//!     → circuit_breaker.rs (record outcome, open circuit if threshold exceeded)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for idempotent requests (GET, HEAD, etc.)
//! - Circuit breaker prevents cascading failures

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerPermit, BreakerSettings, CircuitBreaker, CircuitState};
pub use retries::RetryPolicy;
pub use timeouts::Deadline;
