//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared by every subsystem at startup
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → services applied through the atomic route update
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the service list hot-reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, CircuitBreakerConfig, GatewayConfig, HealthCheckConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RateLimitConfig, RetryConfig, SecurityConfig, TierLimit, TimeoutConfig,
};
pub use watcher::ConfigWatcher;
