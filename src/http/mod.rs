//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (correlation ID, client address)
//!     → handlers.rs (local endpoints) or the request pipeline (proxied)
//!     → response.rs (envelopes, gateway headers)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeCorrelationId, X_CORRELATION_ID};
pub use response::{ErrorEnvelope, SuccessEnvelope, X_GATEWAY_VERSION};
pub use server::{AppState, GatewayServer};
