//! Gateway-originated response envelopes.
//!
//! # Responsibilities
//! - Wrap gateway-local payloads in the success envelope
//! - Render errors in the error envelope (code, message, details)
//! - Strip hop-by-hop headers from proxied responses and tag them
//!
//! # Design Decisions
//! - Proxied responses are never re-wrapped; they only gain headers
//! - Envelope timestamps are RFC 3339 in UTC

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::http::request::X_CORRELATION_ID;
use crate::security::headers::strip_hop_by_hop;

/// Header carrying the gateway build version on every proxied response.
pub const X_GATEWAY_VERSION: HeaderName = HeaderName::from_static("x-gateway-version");

/// Version string stamped on responses and reported by `/health`.
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `{success: true, data, message, timestamp}`
#[derive(Debug, Serialize)]
pub struct SuccessEnvelope<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub message: String,
    pub timestamp: String,
}

impl<T: Serialize> SuccessEnvelope<T> {
    pub fn new(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
            timestamp: timestamp(),
        }
    }
}

impl<T: Serialize> IntoResponse for SuccessEnvelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// `{success: false, error: {code, message, details}, timestamp}`
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn new(code: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code,
                message: message.into(),
                details,
            },
            timestamp: timestamp(),
        }
    }
}

/// Prepare an upstream response for the client: drop hop-by-hop headers and
/// add the correlation id and gateway version.
pub fn tag_passthrough(mut response: Response, correlation_id: &str) -> Response {
    let headers = response.headers_mut();
    strip_hop_by_hop(headers);
    stamp_gateway_headers(headers, correlation_id);
    response
}

pub(crate) fn stamp_gateway_headers(headers: &mut HeaderMap, correlation_id: &str) {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        headers.insert(X_CORRELATION_ID, value);
    }
    headers.insert(X_GATEWAY_VERSION, HeaderValue::from_static(GATEWAY_VERSION));
}
