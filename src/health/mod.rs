//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     One timer task per service
//!     → Probe GET {health_check_path}
//!     → Publish next state.rs record (ArcSwap)
//!
//! State machine (state.rs):
//!     Unknown → Healthy / Degraded / Unhealthy
//!     With a failure threshold to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Health state is per-service, written only by that service's task
//! - Readers load records lock-free
//! - Probes are independent of the request path and the circuit breaker

pub mod active;
pub mod state;

pub use active::{HealthMonitor, HttpProber, Prober};
pub use state::{FleetHealth, HealthRecord, HealthStatus, ProbeOutcome};
