//! Outbound HTTP to backend services.
//!
//! # Responsibilities
//! - Keep one pooled hyper client per service
//! - Send a single attempt under a timeout
//! - Classify transport failures
//!
//! # Design Decisions
//! - No retry logic here; the forwarder owns the attempt loop
//! - The trait seam lets tests script upstream behavior

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, Response};
use dashmap::DashMap;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::TimeoutConfig;
use crate::routing::descriptor::ServiceDescriptor;

/// One fully-buffered request, cheap to clone for retries.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path plus query, already rewritten for the service.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("attempt timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl UpstreamFailure {
    /// Label used on `gateway_proxy_errors_total`.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamFailure::Timeout => "timeout",
            UpstreamFailure::Connect(_) => "connect",
            UpstreamFailure::Request(_) => "request",
        }
    }
}

#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    async fn send(
        &self,
        service: &ServiceDescriptor,
        request: UpstreamRequest,
        timeout: Duration,
    ) -> Result<Response<Body>, UpstreamFailure>;

    /// Release anything held for services no longer routed.
    fn retain_services(&self, _names: &[&str]) {}
}

/// Hyper-backed upstream with a connection pool per service.
pub struct HyperUpstream {
    connect_timeout: Duration,
    idle_timeout: Duration,
    max_idle_per_host: usize,
    clients: DashMap<String, Client<HttpConnector, Body>>,
}

impl HyperUpstream {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
            idle_timeout: Duration::from_secs(timeouts.idle_secs),
            max_idle_per_host: timeouts.max_idle_per_host,
            clients: DashMap::new(),
        }
    }

    fn client(&self, service: &str) -> Client<HttpConnector, Body> {
        if let Some(client) = self.clients.get(service) {
            return client.clone();
        }
        self.clients
            .entry(service.to_string())
            .or_insert_with(|| {
                let mut connector = HttpConnector::new();
                connector.set_connect_timeout(Some(self.connect_timeout));
                connector.set_nodelay(true);
                Client::builder(TokioExecutor::new())
                    .pool_idle_timeout(self.idle_timeout)
                    .pool_max_idle_per_host(self.max_idle_per_host)
                    .build(connector)
            })
            .clone()
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn send(
        &self,
        service: &ServiceDescriptor,
        request: UpstreamRequest,
        timeout: Duration,
    ) -> Result<Response<Body>, UpstreamFailure> {
        let uri = format!("http://{}{}", service.authority(), request.path_and_query);
        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
            headers.remove(header::HOST);
        }
        let outbound = builder
            .body(Body::from(request.body))
            .map_err(|e| UpstreamFailure::Request(e.to_string()))?;

        let client = self.client(&service.name);
        match tokio::time::timeout(timeout, client.request(outbound)).await {
            Ok(Ok(response)) => Ok(response.map(|body: Incoming| Body::new(body))),
            Ok(Err(e)) if e.is_connect() => Err(UpstreamFailure::Connect(e.to_string())),
            Ok(Err(e)) => Err(UpstreamFailure::Request(e.to_string())),
            Err(_) => Err(UpstreamFailure::Timeout),
        }
    }

    fn retain_services(&self, names: &[&str]) {
        let keep: HashSet<&str> = names.iter().copied().collect();
        self.clients.retain(|name, _| keep.contains(name.as_str()));
    }
}
