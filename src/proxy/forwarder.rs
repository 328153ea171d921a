//! Upstream forwarding with retries.
//!
//! # Responsibilities
//! - Run the attempt loop for one request
//! - Report every attempt's outcome to the circuit breaker
//! - Map the final failure to a GatewayError
//!
//! # Design Decisions
//! - Any status below 500 is a success and passes through untouched
//! - Each retry is re-admitted by the breaker; a rejected retry surfaces
//!   the last upstream error
//! - No attempt outlives the request deadline

use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;

use crate::error::GatewayError;
use crate::http::response::tag_passthrough;
use crate::observability::metrics;
use crate::proxy::upstream::{Upstream, UpstreamFailure, UpstreamRequest};
use crate::resilience::circuit_breaker::{BreakerPermit, CircuitBreaker};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::Deadline;
use crate::routing::descriptor::ServiceDescriptor;

pub struct ProxyForwarder {
    upstream: Arc<dyn Upstream>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl ProxyForwarder {
    pub fn new(upstream: Arc<dyn Upstream>, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self {
            upstream,
            breaker,
            retry,
        }
    }

    /// Forward `request` to `service`.
    ///
    /// `permit` is the breaker admission for the first attempt.
    pub async fn forward(
        &self,
        service: &ServiceDescriptor,
        permit: BreakerPermit,
        request: UpstreamRequest,
        deadline: Deadline,
        correlation_id: &str,
    ) -> Result<Response<Body>, GatewayError> {
        let max_attempts = self
            .retry
            .attempts_for(&request.method, service.retry_non_idempotent);
        let mut current = permit;
        let mut attempt = 1u32;

        loop {
            let Some(timeout) = deadline.attempt_timeout(service.timeout()) else {
                current.failure();
                return Err(GatewayError::UpstreamTimeout {
                    service: service.name.clone(),
                });
            };

            let err = match self.upstream.send(service, request.clone(), timeout).await {
                Ok(response) if !response.status().is_server_error() => {
                    current.success();
                    return Ok(tag_passthrough(response, correlation_id));
                }
                Ok(response) => {
                    current.failure();
                    metrics::record_proxy_error(&service.name, "status");
                    GatewayError::UpstreamError {
                        service: service.name.clone(),
                        status: response.status().as_u16(),
                    }
                }
                Err(failure) => {
                    current.failure();
                    metrics::record_proxy_error(&service.name, failure.kind());
                    map_failure(service, failure)
                }
            };

            tracing::warn!(
                correlation_id,
                service = %service.name,
                attempt,
                max_attempts,
                error = %err,
                "Upstream attempt failed"
            );

            if attempt >= max_attempts || deadline.is_expired() {
                return Err(err);
            }

            tokio::time::sleep(self.retry.delay_after(attempt, deadline.remaining())).await;
            if deadline.is_expired() {
                return Err(err);
            }

            // A retry the breaker refuses surfaces this attempt's error.
            current = match self.breaker.admit(&service.name) {
                Ok(next) => next,
                Err(rejected) => {
                    tracing::debug!(service = %service.name, reason = %rejected, "Retry not admitted");
                    return Err(err);
                }
            };
            attempt += 1;
        }
    }
}

fn map_failure(service: &ServiceDescriptor, failure: UpstreamFailure) -> GatewayError {
    match failure {
        UpstreamFailure::Timeout => GatewayError::UpstreamTimeout {
            service: service.name.clone(),
        },
        UpstreamFailure::Connect(reason) | UpstreamFailure::Request(reason) => {
            GatewayError::UpstreamUnreachable {
                service: service.name.clone(),
                reason,
            }
        }
    }
}
