//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (load current table snapshot)
//!     → table.rs (longest prefix lookup)
//!     → matcher.rs (segment-aligned prefix test)
//!     → Return: RouteMatch or NotFound
//!
//! Route Compilation (startup and admin update):
//!     ServiceDescriptor[]
//!     → Validate (duplicate prefixes / names)
//!     → Sort by prefix length
//!     → Freeze as immutable RouteTable
//!     → Atomic swap
//! ```
//!
//! # Design Decisions
//! - Tables are immutable; updates build a new one
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod descriptor;
pub mod matcher;
pub mod router;
pub mod table;

pub use descriptor::{AuthLevel, ServiceDescriptor};
pub use router::Router;
pub use table::{RouteError, RouteMatch, RouteTable};
