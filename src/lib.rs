//! API gateway library.
//!
//! A single entry point that routes client requests to backend services,
//! enforcing authentication, rate limits and failure isolation.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                     API GATEWAY                      │
//!                       │                                                      │
//!   Client Request      │  ┌────────┐   ┌──────────┐   ┌─────────┐   ┌──────┐  │
//!   ────────────────────┼─▶│  http  │──▶│ pipeline │──▶│ routing │──▶│ auth │  │
//!                       │  │ server │   │          │   │  table  │   │ gate │  │
//!                       │  └────────┘   └──────────┘   └─────────┘   └──┬───┘  │
//!                       │                                               ▼      │
//!                       │  ┌─────────┐   ┌───────────┐   ┌──────────────────┐  │
//!   Client Response     │  │  proxy  │◀──│  circuit  │◀──│   rate limiter   │  │
//!   ◀───────────────────┼──│forwarder│   │  breaker  │   └──────────────────┘  │
//!                       │  └────┬────┘   └───────────┘                         │
//!                       │       ▼                                              │
//!                       │   Backend services ◀── health monitor (per service)  │
//!                       │                                                      │
//!                       │  Cross-cutting: config, observability, lifecycle,    │
//!                       │                 admin API                            │
//!                       └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod pipeline;
pub mod proxy;
pub mod routing;

// Per-service state
pub mod health;
pub mod resilience;
pub mod security;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
