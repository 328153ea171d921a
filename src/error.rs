//! Request-level error taxonomy.
//!
//! Every pipeline stage fails with a [`GatewayError`]. The variant decides the
//! HTTP status, the stable error code and what may be disclosed to the
//! client. Internal diagnostics stay in the logs.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::http::response::ErrorEnvelope;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("no route matches path {path}")]
    RouteNotFound { path: String },

    #[error("authentication required: {reason}")]
    Unauthenticated { reason: &'static str },

    #[error("role {required} required")]
    Unauthorized { required: &'static str },

    #[error("token expired")]
    TokenExpired,

    #[error("rate limit exceeded for tier {tier}")]
    RateLimited {
        tier: &'static str,
        limit: u32,
        retry_after: Duration,
    },

    #[error("circuit open for service {service}")]
    CircuitOpen {
        service: String,
        retry_after: Duration,
    },

    #[error("service {service} timed out")]
    UpstreamTimeout { service: String },

    #[error("service {service} unreachable: {reason}")]
    UpstreamUnreachable { service: String, reason: String },

    #[error("service {service} answered {status}")]
    UpstreamError { service: String, status: u16 },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("gateway configuration error: {0}")]
    InternalConfigError(String),

    #[error("route update rejected")]
    InvalidRouteUpdate { problems: Vec<String> },

    #[error("unknown service {0}")]
    UnknownService(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            GatewayError::TokenExpired => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamError { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::InternalConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidRouteUpdate { .. } => StatusCode::BAD_REQUEST,
            GatewayError::UnknownService(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            GatewayError::Unauthenticated { .. } => "UNAUTHENTICATED",
            GatewayError::Unauthorized { .. } => "PERMISSION_DENIED",
            GatewayError::TokenExpired => "TOKEN_EXPIRED",
            GatewayError::RateLimited { .. } => "RATE_LIMITED",
            GatewayError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            GatewayError::UpstreamTimeout { .. } => "SERVICE_TIMEOUT",
            GatewayError::UpstreamUnreachable { .. } => "SERVICE_UNAVAILABLE",
            GatewayError::UpstreamError { .. } => "UPSTREAM_ERROR",
            GatewayError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            GatewayError::InternalConfigError(_) => "INTERNAL_ERROR",
            GatewayError::InvalidRouteUpdate { .. } => "VALIDATION_ERROR",
            GatewayError::UnknownService(_) => "SERVICE_NOT_FOUND",
        }
    }

    /// Rate limiting and open circuits are expected back-pressure, not faults.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::CircuitOpen { .. }
        )
    }

    /// Failures that count against a service's circuit breaker.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamTimeout { .. }
                | GatewayError::UpstreamUnreachable { .. }
                | GatewayError::UpstreamError { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after, .. }
            | GatewayError::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            GatewayError::RouteNotFound { path } => format!("No service found for path: {path}"),
            GatewayError::Unauthenticated { reason } => (*reason).to_string(),
            GatewayError::Unauthorized { required } => format!("{required} privileges required"),
            GatewayError::TokenExpired => "Token has expired".to_string(),
            GatewayError::RateLimited { .. } => "Rate limit exceeded".to_string(),
            GatewayError::CircuitOpen { service, .. } => {
                format!("Service {service} is temporarily unavailable")
            }
            GatewayError::UpstreamTimeout { service } => {
                format!("Service {service} unavailable (timeout)")
            }
            GatewayError::UpstreamUnreachable { service, .. } => {
                format!("Service {service} unavailable (connection error)")
            }
            GatewayError::UpstreamError { service, .. } => {
                format!("Service {service} failed to handle the request")
            }
            GatewayError::PayloadTooLarge { .. } => "Request body too large".to_string(),
            GatewayError::InternalConfigError(_) => "Internal gateway error".to_string(),
            GatewayError::InvalidRouteUpdate { .. } => "Route update rejected".to_string(),
            GatewayError::UnknownService(name) => format!("Unknown service: {name}"),
        }
    }

    fn details(&self) -> Value {
        match self {
            GatewayError::RateLimited {
                tier,
                limit,
                retry_after,
            } => json!({
                "tier": tier,
                "limit": limit,
                "retry_after_secs": retry_after.as_secs(),
            }),
            GatewayError::CircuitOpen { retry_after, .. } => json!({
                "retry_after_secs": retry_after.as_secs(),
            }),
            GatewayError::UpstreamError { status, .. } => json!({ "upstream_status": status }),
            GatewayError::PayloadTooLarge { limit } => json!({ "max_body_size": limit }),
            GatewayError::InvalidRouteUpdate { problems } => json!({ "problems": problems }),
            _ => Value::Null,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope::new(self.code(), self.public_message(), self.details());
        let mut response = (self.status(), Json(envelope)).into_response();
        if let Some(retry_after) = self.retry_after() {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
