//! Backend service descriptors.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Authentication a route demands, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    Public,
    User,
    Admin,
    System,
}

impl AuthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthLevel::Public => "public",
            AuthLevel::User => "user",
            AuthLevel::Admin => "admin",
            AuthLevel::System => "system",
        }
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

fn default_strip_prefix() -> bool {
    true
}

/// One backend service reachable through the gateway.
///
/// Descriptors are immutable once loaded; a route update replaces them
/// wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDescriptor {
    /// Unique service name, used for breaker, health and metrics labels.
    pub name: String,

    /// Backend host (name or IP).
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Path prefix routed to this service, e.g. `/api/auth/`.
    pub path_prefix: String,

    /// Per-attempt upstream timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Required authentication level.
    pub auth_level: AuthLevel,

    /// Path probed by the health monitor.
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,

    /// Remove the matched prefix before forwarding.
    #[serde(default = "default_strip_prefix")]
    pub strip_prefix: bool,

    /// Allow retries of non-idempotent methods for this service.
    #[serde(default)]
    pub retry_non_idempotent: bool,
}

impl ServiceDescriptor {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        path_prefix: impl Into<String>,
        auth_level: AuthLevel,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            path_prefix: path_prefix.into(),
            timeout_secs: default_timeout_secs(),
            auth_level,
            health_check_path: default_health_check_path(),
            strip_prefix: default_strip_prefix(),
            retry_non_idempotent: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `host:port`, used as the URI authority.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Where the health monitor should probe.
    pub fn health_url(&self) -> String {
        format!("http://{}{}", self.authority(), self.health_check_path)
    }

    /// True when a probe target changed, i.e. the health task must restart.
    pub fn probe_target_differs(&self, other: &ServiceDescriptor) -> bool {
        self.host != other.host
            || self.port != other.port
            || self.health_check_path != other.health_check_path
    }
}
