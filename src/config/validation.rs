//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, thresholds > 0)
//! - Detect conflicting routes (duplicate prefixes or service names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Service checks are shared with the admin route update

use std::collections::HashSet;

use crate::config::schema::{GatewayConfig, TierLimit};
use crate::routing::descriptor::ServiceDescriptor;
use crate::routing::matcher::normalize_prefix;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("service {0}: name is used twice")]
    DuplicateService(String),

    #[error("prefix {prefix} is claimed by both {first} and {second}")]
    DuplicatePrefix {
        prefix: String,
        first: String,
        second: String,
    },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Validate a full configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(invalid("listener.bind_address", "not a socket address"));
    }
    if config.listener.max_connections == 0 {
        errors.push(invalid("listener.max_connections", "must be > 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(invalid("timeouts.request_secs", "must be > 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(invalid("timeouts.connect_secs", "must be > 0"));
    }

    let hc = &config.health_check;
    if hc.enabled {
        if hc.interval_secs == 0 {
            errors.push(invalid("health_check.interval_secs", "must be > 0"));
        }
        if hc.timeout_secs == 0 {
            errors.push(invalid("health_check.timeout_secs", "must be > 0"));
        }
        if hc.unhealthy_threshold == 0 {
            errors.push(invalid("health_check.unhealthy_threshold", "must be > 0"));
        }
    }

    let rl = &config.rate_limit;
    for (name, tier) in [
        ("default", rl.default),
        ("authenticated", rl.authenticated),
        ("public", rl.public),
    ] {
        check_tier(name, tier, &mut errors);
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(invalid("rate_limit.sweep_interval_secs", "must be > 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(invalid("retries.max_attempts", "must be >= 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(invalid("retries.base_delay_ms", "must not exceed max_delay_ms"));
    }

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(invalid("circuit_breaker.failure_threshold", "must be > 0"));
    }
    if cb.success_threshold == 0 {
        errors.push(invalid("circuit_breaker.success_threshold", "must be > 0"));
    }
    if cb.half_open_max_calls == 0 {
        errors.push(invalid("circuit_breaker.half_open_max_calls", "must be > 0"));
    }

    if config.auth.jwt_secret.trim().is_empty() {
        errors.push(invalid("auth.jwt_secret", "must not be empty"));
    }

    if let Err(service_errors) = validate_services(&config.services) {
        errors.extend(service_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_tier(name: &str, tier: TierLimit, errors: &mut Vec<ValidationError>) {
    if tier.limit == 0 {
        errors.push(invalid(format!("rate_limit.{name}.limit"), "must be > 0"));
    }
    if tier.window_secs == 0 {
        errors.push(invalid(format!("rate_limit.{name}.window_secs"), "must be > 0"));
    }
}

/// Validate a set of service descriptors as one route table.
pub fn validate_services(services: &[ServiceDescriptor]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();
    let mut prefixes: Vec<(String, &str)> = Vec::new();

    for service in services {
        let field = |name: &str| format!("services.{}.{}", service.name, name);

        if service.name.trim().is_empty() {
            errors.push(invalid("services.name", "must not be empty"));
        } else if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }

        if service.host.trim().is_empty() || service.host.contains(['/', ' ']) {
            errors.push(invalid(field("host"), "must be a bare host name"));
        }
        if service.port == 0 {
            errors.push(invalid(field("port"), "must be > 0"));
        }
        if service.timeout_secs == 0 {
            errors.push(invalid(field("timeout_secs"), "must be > 0"));
        }
        if !service.health_check_path.starts_with('/') {
            errors.push(invalid(field("health_check_path"), "must start with '/'"));
        }

        if !service.path_prefix.starts_with('/') {
            errors.push(invalid(field("path_prefix"), "must start with '/'"));
            continue;
        }
        if service.path_prefix.contains("//") {
            errors.push(invalid(field("path_prefix"), "must not contain empty segments"));
            continue;
        }

        let normalized = normalize_prefix(&service.path_prefix);
        match prefixes.iter().find(|(p, _)| *p == normalized) {
            Some((_, owner)) => errors.push(ValidationError::DuplicatePrefix {
                prefix: normalized,
                first: owner.to_string(),
                second: service.name.clone(),
            }),
            None => prefixes.push((normalized, service.name.as_str())),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
