//! Request dispatch pipeline.
//!
//! # Data Flow
//! ```text
//! Client Request
//!     → context.rs (correlation ID, client address, start time)
//!     → routing (longest prefix)         → 404 ROUTE_NOT_FOUND
//!     → security::auth (route level)     → 401 / 403
//!     → security::rate_limit (tier)      → 429 + Retry-After
//!     → resilience::circuit_breaker      → 503 + Retry-After
//!     → proxy::forwarder (retries)       → 502 / 504
//!     → access record + metrics
//! ```
//!
//! # Design Decisions
//! - Every stage short-circuits with a GatewayError rendered as an envelope
//! - The whole pipeline runs under one deadline; expiry cancels the upstream
//!   call and the dropped breaker permit counts as a failure
//! - The body is buffered before breaker admission so a client that stalls
//!   uploading never costs the backend a failure

pub mod context;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::response::{IntoResponse, Response};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::request::{with_query, X_CORRELATION_ID};
use crate::http::response::stamp_gateway_headers;
use crate::observability::{log_access, metrics, AccessRecord};
use crate::proxy::{ProxyForwarder, UpstreamRequest};
use crate::resilience::timeouts::Deadline;
use crate::resilience::CircuitBreaker;
use crate::routing::{RouteError, Router};
use crate::security::headers::{append_forwarded, client_ip, inject_identity, strip_hop_by_hop, strip_identity};
use crate::security::rate_limit::{ClientKey, Quota, Tier};
use crate::security::{AuthGate, RateLimiter};

pub use context::{Outcome, RequestContext};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub trust_forwarded_for: bool,
}

impl From<&GatewayConfig> for PipelineSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            max_body_size: config.security.max_body_size,
            trust_forwarded_for: config.security.trust_forwarded_for,
        }
    }
}

pub struct RequestPipeline {
    router: Arc<Router>,
    auth: Arc<AuthGate>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    forwarder: ProxyForwarder,
    settings: PipelineSettings,
}

impl RequestPipeline {
    pub fn new(
        router: Arc<Router>,
        auth: Arc<AuthGate>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        forwarder: ProxyForwarder,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            router,
            auth,
            limiter,
            breaker,
            forwarder,
            settings,
        }
    }

    /// Run one proxied request through every stage.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let _active = metrics::ActiveGuard::enter();
        let mut ctx = RequestContext::from_request(&request);
        let deadline = Deadline::starting_at(ctx.started, self.settings.request_timeout);

        let outcome =
            tokio::time::timeout(self.settings.request_timeout, self.dispatch(&mut ctx, request, deadline))
                .await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(GatewayError::UpstreamTimeout {
                service: ctx.service.clone().unwrap_or_else(|| "gateway".to_string()),
            }),
        };

        let response = match result {
            Ok(response) => {
                ctx.outcome = Some(Outcome {
                    status: response.status().as_u16(),
                    error_code: None,
                    expected: false,
                });
                response
            }
            Err(err) => {
                ctx.outcome = Some(Outcome {
                    status: err.status().as_u16(),
                    error_code: Some(err.code()),
                    expected: err.is_expected(),
                });
                if err.is_upstream_failure() {
                    tracing::error!(
                        correlation_id = %ctx.correlation_id,
                        error = %err,
                        "Upstream failure surfaced to client"
                    );
                }
                let mut response = err.into_response();
                stamp_gateway_headers(response.headers_mut(), &ctx.correlation_id);
                response
            }
        };

        finish(&ctx);
        response
    }

    async fn dispatch(
        &self,
        ctx: &mut RequestContext,
        request: Request<Body>,
        deadline: Deadline,
    ) -> Result<Response, GatewayError> {
        let route = self.router.lookup(&ctx.path).map_err(|err| match err {
            RouteError::NotFound(path) => GatewayError::RouteNotFound { path },
            other => GatewayError::InternalConfigError(other.to_string()),
        })?;
        let service = route.descriptor.clone();
        ctx.service = Some(service.name.clone());

        let (parts, body) = request.into_parts();

        let claims = self.auth.check(service.auth_level, &parts.headers)?;

        let tier = Tier::select(claims.as_ref(), service.auth_level);
        let ip = client_ip(&parts.headers, ctx.client_addr, self.settings.trust_forwarded_for);
        let quota = self.limiter.check(&ClientKey::resolve(claims.as_ref(), ip), tier)?;

        let body = axum::body::to_bytes(body, self.settings.max_body_size)
            .await
            .map_err(|_| GatewayError::PayloadTooLarge {
                limit: self.settings.max_body_size,
            })?;

        let permit = self.breaker.admit(&service.name)?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        strip_identity(&mut headers);
        if let Some(claims) = &claims {
            inject_identity(&mut headers, claims, service.auth_level);
        }
        append_forwarded(&mut headers, ctx.client_addr);
        if let Ok(value) = HeaderValue::from_str(&ctx.correlation_id) {
            headers.insert(X_CORRELATION_ID, value);
        }
        ctx.claims = claims;

        let upstream_request = UpstreamRequest {
            method: parts.method,
            path_and_query: with_query(&route.upstream_path, &parts.uri),
            headers,
            body,
        };

        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            service = %service.name,
            prefix = %route.prefix,
            upstream_path = %upstream_request.path_and_query,
            "Forwarding request"
        );

        let mut response = self
            .forwarder
            .forward(&service, permit, upstream_request, deadline, &ctx.correlation_id)
            .await?;
        if let Some(quota) = quota {
            add_quota_headers(&mut response, quota);
        }
        Ok(response)
    }
}

fn add_quota_headers(response: &mut Response, quota: Quota) {
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
}

fn finish(ctx: &RequestContext) {
    let Some(outcome) = ctx.outcome else {
        return;
    };
    let elapsed = ctx.started.elapsed();
    let service = ctx.service.as_deref();

    log_access(&AccessRecord {
        correlation_id: &ctx.correlation_id,
        method: ctx.method.as_str(),
        path: &ctx.path,
        status: outcome.status,
        elapsed,
        service,
        error_code: outcome.error_code,
        expected: outcome.expected,
    });
    metrics::record_request(ctx.method.as_str(), outcome.status, service.unwrap_or("none"), elapsed);
}
