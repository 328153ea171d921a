//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (strip forged identity and hop-by-hop headers)
//!     → auth.rs (verify bearer token against the route's auth level)
//!     → rate_limit.rs (count against the client's tier bucket)
//!     → headers.rs (inject verified identity, X-Forwarded-*)
//!     → Pass to resilience / proxy
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Body size is capped by the HTTP layer before the pipeline runs

pub mod auth;
pub mod headers;
pub mod rate_limit;

pub use auth::{AuthGate, Claims};
pub use rate_limit::{ClientKey, RateLimiter, Tier};
