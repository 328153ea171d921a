//! Upstream proxying subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request (breaker permit held)
//!     → forwarder.rs (attempt loop, retries, breaker reporting)
//!     → upstream.rs (pooled hyper client, one attempt under timeout)
//!     → Backend service
//! ```

pub mod forwarder;
pub mod upstream;

pub use forwarder::ProxyForwarder;
pub use upstream::{HyperUpstream, Upstream, UpstreamFailure, UpstreamRequest};
