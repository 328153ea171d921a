//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate the correlation ID (UUID v4) for requests without one
//! - Extract the client address and correlation ID
//! - Rebuild the path and query forwarded upstream
//!
//! # Design Decisions
//! - Correlation ID added as early as possible for tracing
//! - A well-formed inbound X-Correlation-ID is honored
//! - Body size is capped before the body is buffered

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the correlation ID in both directions.
pub const X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

const MAX_CORRELATION_ID_LEN: usize = 128;

/// Produces a fresh UUID v4 for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

fn acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CORRELATION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
}

/// The request's correlation ID, or a new one when missing or malformed.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(&X_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|id| acceptable(id))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Peer address recorded by `into_make_service_with_connect_info`.
pub fn client_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// `path` followed by the original query string, if any.
pub fn with_query(path: &str, uri: &Uri) -> String {
    match uri.query() {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_id_is_honored() {
        let mut headers = HeaderMap::new();
        headers.insert(X_CORRELATION_ID, HeaderValue::from_static("req-42"));
        assert_eq!(correlation_id(&headers), "req-42");
    }

    #[test]
    fn malformed_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(X_CORRELATION_ID, HeaderValue::from_static("has spaces in it"));
        let id = correlation_id(&headers);
        assert_ne!(id, "has spaces in it");
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn query_is_preserved() {
        let uri: Uri = "/api/news/list?page=2".parse().unwrap();
        assert_eq!(with_query("/list", &uri), "/list?page=2");
        let uri: Uri = "/api/news/list".parse().unwrap();
        assert_eq!(with_query("/list", &uri), "/list");
    }

    #[test]
    fn make_correlation_id_is_uuid() {
        let request = Request::new(());
        let id = MakeCorrelationId.make_request_id(&request).unwrap();
        assert!(Uuid::parse_str(id.header_value().to_str().unwrap()).is_ok());
    }
}
