//! Per-request state carried through the pipeline.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Method, Request};
use tokio::time::Instant;

use crate::http::request::{client_addr, correlation_id};
use crate::security::auth::Claims;

/// How the request ended, for the access record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: u16,
    pub error_code: Option<&'static str>,
    pub expected: bool,
}

#[derive(Debug)]
pub struct RequestContext {
    pub correlation_id: String,
    pub client_addr: Option<SocketAddr>,
    pub method: Method,
    pub path: String,
    pub started: Instant,
    pub claims: Option<Claims>,
    /// Name of the matched service, once routing succeeded.
    pub service: Option<String>,
    pub outcome: Option<Outcome>,
}

impl RequestContext {
    pub fn from_request(request: &Request<Body>) -> Self {
        Self {
            correlation_id: correlation_id(request.headers()),
            client_addr: client_addr(request),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            started: Instant::now(),
            claims: None,
            service: None,
            outcome: None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.claims.as_ref().map(|c| c.sub.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::X_CORRELATION_ID;

    #[test]
    fn context_reads_request_line() {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/api/users/7?force=1")
            .header(X_CORRELATION_ID, "abc-123")
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::from_request(&request);
        assert_eq!(ctx.correlation_id, "abc-123");
        assert_eq!(ctx.method, Method::DELETE);
        assert_eq!(ctx.path, "/api/users/7");
        assert!(ctx.client_addr.is_none());
        assert!(ctx.user_id().is_none());
    }
}
