//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Choose pretty or JSON output
//! - Emit the per-request access record
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` wins over the configured level

use std::time::Duration;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Target of the one-line-per-request access log.
pub const ACCESS_TARGET: &str = "gateway::access";

fn filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},api_gateway={level},tower_http=info",
            level = config.log_level
        ))
    })
}

/// Install the global subscriber. Returns false if one was already set.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let registry = tracing_subscriber::registry().with(filter(config));
    let result = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.is_ok()
}

/// Fields of one access record.
#[derive(Debug)]
pub struct AccessRecord<'a> {
    pub correlation_id: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub status: u16,
    pub elapsed: Duration,
    pub service: Option<&'a str>,
    pub error_code: Option<&'static str>,
    /// Back-pressure rejections (rate limit, open circuit) log at warn.
    pub expected: bool,
}

/// Level of the access record for a finished request.
pub fn access_level(status: u16, expected: bool) -> Level {
    match status {
        500.. if !expected => Level::ERROR,
        400.. => Level::WARN,
        _ => Level::INFO,
    }
}

pub fn log_access(record: &AccessRecord<'_>) {
    let duration_ms = record.elapsed.as_secs_f64() * 1_000.0;
    let service = record.service.unwrap_or("-");
    let error_code = record.error_code.unwrap_or("-");
    let level = access_level(record.status, record.expected);
    if level == Level::ERROR {
        tracing::error!(
            target: ACCESS_TARGET,
            correlation_id = record.correlation_id,
            method = record.method,
            path = record.path,
            status = record.status,
            duration_ms,
            service,
            error_code,
            "request failed"
        );
    } else if level == Level::WARN {
        tracing::warn!(
            target: ACCESS_TARGET,
            correlation_id = record.correlation_id,
            method = record.method,
            path = record.path,
            status = record.status,
            duration_ms,
            service,
            error_code,
            "request rejected"
        );
    } else {
        tracing::info!(
            target: ACCESS_TARGET,
            correlation_id = record.correlation_id,
            method = record.method,
            path = record.path,
            status = record.status,
            duration_ms,
            service,
            "request completed"
        );
    }
}
