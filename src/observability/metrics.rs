//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, errors, connections)
//! - Render the Prometheus text format for `/metrics`
//! - Keep in-process tallies for the `/metrics/summary` digest
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_active_connections` (gauge): in-flight requests
//! - `gateway_service_health` (gauge): 1=healthy, 0.5=degraded, 0=unhealthy
//! - `gateway_rate_limit_hits_total` (counter): rejections by tier
//! - `gateway_auth_attempts_total` (counter): verifications by outcome
//! - `gateway_proxy_errors_total` (counter): upstream failures by service, kind
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Recorder installed at most once per process
//! - Histogram buckets tuned for typical web latencies

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use serde::Serialize;

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();
static TALLY: OnceLock<Tally> = OnceLock::new();

#[derive(Default)]
struct Tally {
    requests: AtomicU64,
    errors: AtomicU64,
    rate_limited: AtomicU64,
    auth_failures: AtomicU64,
    proxy_errors: AtomicU64,
    active: AtomicI64,
    duration_micros: AtomicU64,
    by_service: Mutex<BTreeMap<String, u64>>,
}

fn tally() -> &'static Tally {
    TALLY.get_or_init(Tally::default)
}

/// Install the Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() {
    HANDLE.get_or_init(|| {
        let builder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        ) {
            Ok(builder) => builder,
            Err(e) => {
                tracing::error!(error = %e, "Invalid histogram buckets");
                PrometheusBuilder::new()
            }
        };
        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus recorder installed");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Metrics recorder not installed");
                None
            }
        }
    });
}

/// Prometheus text exposition, if the recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().and_then(|h| h.as_ref()).map(|h| h.render())
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, service: &str, elapsed: Duration) {
    let is_error = status >= 400;
    let status = status.to_string();
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.clone(),
        "service" => service.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status,
        "service" => service.to_string()
    )
    .record(elapsed.as_secs_f64());

    let t = tally();
    t.requests.fetch_add(1, Ordering::Relaxed);
    if is_error {
        t.errors.fetch_add(1, Ordering::Relaxed);
    }
    t.duration_micros
        .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    *t.by_service.lock().entry(service.to_string()).or_default() += 1;
}

pub fn record_rate_limited(tier: &'static str) {
    counter!("gateway_rate_limit_hits_total", "tier" => tier).increment(1);
    tally().rate_limited.fetch_add(1, Ordering::Relaxed);
}

pub fn record_auth_attempt(outcome: &'static str) {
    counter!("gateway_auth_attempts_total", "outcome" => outcome).increment(1);
    if outcome != "success" {
        tally().auth_failures.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_proxy_error(service: &str, kind: &'static str) {
    counter!("gateway_proxy_errors_total", "service" => service.to_string(), "kind" => kind)
        .increment(1);
    tally().proxy_errors.fetch_add(1, Ordering::Relaxed);
}

/// 1.0 healthy, 0.5 degraded, 0.0 unhealthy or unknown.
pub fn record_service_health(service: &str, value: f64) {
    gauge!("gateway_service_health", "service" => service.to_string()).set(value);
}

/// Tracks one in-flight request for `gateway_active_connections`.
#[derive(Debug)]
pub struct ActiveGuard(());

impl ActiveGuard {
    pub fn enter() -> Self {
        let now = tally().active.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("gateway_active_connections").set(now as f64);
        Self(())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let now = tally().active.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!("gateway_active_connections").set(now as f64);
    }
}

/// JSON digest served by `/metrics/summary`.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_requests: u64,
    pub error_requests: u64,
    pub error_rate: f64,
    pub average_duration_ms: f64,
    pub active_connections: i64,
    pub rate_limit_hits: u64,
    pub auth_failures: u64,
    pub proxy_errors: u64,
    pub requests_by_service: BTreeMap<String, u64>,
}

pub fn summary() -> Summary {
    let t = tally();
    let total = t.requests.load(Ordering::Relaxed);
    let errors = t.errors.load(Ordering::Relaxed);
    let micros = t.duration_micros.load(Ordering::Relaxed);
    let ratio = |n: f64| if total == 0 { 0.0 } else { n / total as f64 };

    Summary {
        total_requests: total,
        error_requests: errors,
        error_rate: ratio(errors as f64),
        average_duration_ms: ratio(micros as f64 / 1_000.0),
        active_connections: t.active.load(Ordering::Relaxed),
        rate_limit_hits: t.rate_limited.load(Ordering::Relaxed),
        auth_failures: t.auth_failures.load(Ordering::Relaxed),
        proxy_errors: t.proxy_errors.load(Ordering::Relaxed),
        requests_by_service: t.by_service.lock().clone(),
    }
}
