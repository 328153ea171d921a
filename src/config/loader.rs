//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{AuthConfig, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_BIND_ADDRESS: &str = "GATEWAY_BIND_ADDRESS";
pub const ENV_JWT_SECRET: &str = "GATEWAY_JWT_SECRET";
pub const ENV_LOG_LEVEL: &str = "GATEWAY_LOG_LEVEL";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// `GATEWAY_*` environment variables override the file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Parse, apply overrides from `env`, then validate.
pub fn parse_config(
    content: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, env);
    validate_config(&config).map_err(ConfigError::Validation)?;

    if config.auth.jwt_secret == AuthConfig::default().jwt_secret {
        tracing::warn!("Using the placeholder JWT secret; set {ENV_JWT_SECRET} in production");
    }
    Ok(config)
}

pub fn apply_env_overrides(config: &mut GatewayConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(addr) = env(ENV_BIND_ADDRESS) {
        config.listener.bind_address = addr;
    }
    if let Some(secret) = env(ENV_JWT_SECRET) {
        config.auth.jwt_secret = secret;
    }
    if let Some(level) = env(ENV_LOG_LEVEL) {
        config.observability.log_level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::descriptor::AuthLevel;

    const SAMPLE: &str = r#"
[listener]
bind_address = "127.0.0.1:8000"

[circuit_breaker]
failure_threshold = 3

[[services]]
name = "auth"
host = "auth-service"
port = 8001
path_prefix = "/api/auth/"
auth_level = "public"

[[services]]
name = "admin"
host = "admin-service"
port = 8005
path_prefix = "/api/admin/"
auth_level = "admin"
timeout_secs = 10
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn sample_parses() {
        let config = parse_config(SAMPLE, no_env).unwrap();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[1].auth_level, AuthLevel::Admin);
        assert_eq!(config.services[1].timeout_secs, 10);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
    }

    #[test]
    fn environment_overrides_file() {
        let config = parse_config(SAMPLE, |key| match key {
            ENV_BIND_ADDRESS => Some("0.0.0.0:9999".to_string()),
            ENV_JWT_SECRET => Some("from-env".to_string()),
            ENV_LOG_LEVEL => Some("debug".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:9999");
        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn unknown_service_field_is_a_parse_error() {
        let content = r#"
[[services]]
name = "auth"
host = "auth-service"
port = 8001
path_prefix = "/api/auth/"
auth_level = "public"
colour = "blue"
"#;
        assert!(matches!(parse_config(content, no_env), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn validation_collects_every_problem() {
        let content = r#"
[timeouts]
request_secs = 0

[[services]]
name = "a"
host = "a"
port = 1
path_prefix = "/x/"
auth_level = "public"

[[services]]
name = "b"
host = "b"
port = 2
path_prefix = "/x"
auth_level = "user"
"#;
        match parse_config(content, no_env) {
            Err(ConfigError::Validation(errors)) => assert!(errors.len() >= 2),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn bundled_sample_is_valid() {
        let config = parse_config(include_str!("../../gateway.toml"), no_env).unwrap();
        assert_eq!(config.services.len(), 7);
        assert_eq!(config.observability.log_format, crate::config::LogFormat::Json);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
