//! Active health checking.
//!
//! # Responsibilities
//! - Run one probe task per service
//! - Publish each service's latest HealthRecord
//! - Follow route table changes (start, restart, stop tasks)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use chrono::Utc;
use dashmap::DashMap;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::HealthCheckConfig;
use crate::health::state::{aggregate, FleetHealth, HealthRecord, HealthThresholds, ProbeOutcome};
use crate::observability::metrics;
use crate::routing::descriptor::ServiceDescriptor;

/// Something that can tell whether a service answers its health path.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, service: &ServiceDescriptor, timeout: Duration) -> ProbeOutcome;
}

/// Probes `GET http://host:port{health_check_path}`; any 2xx is a success.
pub struct HttpProber {
    client: Client<HttpConnector, Body>,
}

impl HttpProber {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        Self {
            client: Client::builder(TokioExecutor::new())
                .pool_max_idle_per_host(1)
                .build(connector),
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, service: &ServiceDescriptor, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let request = match Request::get(service.health_url())
            .header(header::USER_AGENT, "api-gateway-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                return ProbeOutcome::Failure {
                    latency: Duration::ZERO,
                    error: format!("invalid health url: {e}"),
                }
            }
        };

        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => ProbeOutcome::Success {
                latency: started.elapsed(),
            },
            Ok(Ok(response)) => ProbeOutcome::Failure {
                latency: started.elapsed(),
                error: format!("HTTP {}", response.status().as_u16()),
            },
            Ok(Err(e)) => ProbeOutcome::Failure {
                latency: started.elapsed(),
                error: format!("Connection error: {e}"),
            },
            Err(_) => ProbeOutcome::Failure {
                latency: started.elapsed(),
                error: "Request timeout".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ProbeSettings {
    enabled: bool,
    interval: Duration,
    timeout: Duration,
    thresholds: HealthThresholds,
}

struct ProbeTask {
    descriptor: Arc<ServiceDescriptor>,
    handle: Option<JoinHandle<()>>,
}

/// Owner of every service's health record and probe task.
pub struct HealthMonitor {
    settings: ProbeSettings,
    prober: Arc<dyn Prober>,
    records: DashMap<String, Arc<ArcSwap<HealthRecord>>>,
    tasks: Mutex<HashMap<String, ProbeTask>>,
    shutdown: broadcast::Sender<()>,
}

impl HealthMonitor {
    pub fn new(config: &HealthCheckConfig, prober: Arc<dyn Prober>, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            settings: ProbeSettings {
                enabled: config.enabled,
                interval: Duration::from_secs(config.interval_secs.max(1)),
                timeout: Duration::from_secs(config.timeout_secs.max(1)),
                thresholds: HealthThresholds::from(config),
            },
            prober,
            records: DashMap::new(),
            tasks: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Align probe tasks with `services`.
    ///
    /// Unchanged services keep their task and record. Services whose probe
    /// target moved restart from Unknown. Removed services stop.
    pub fn sync(&self, services: &[Arc<ServiceDescriptor>]) {
        let mut tasks = self.tasks.lock();

        let wanted: HashMap<&str, &Arc<ServiceDescriptor>> =
            services.iter().map(|d| (d.name.as_str(), d)).collect();

        tasks.retain(|name, task| {
            let keep = match wanted.get(name.as_str()) {
                Some(next) => !task.descriptor.probe_target_differs(next),
                None => false,
            };
            if !keep {
                if let Some(handle) = task.handle.take() {
                    handle.abort();
                }
                self.records.remove(name);
                tracing::debug!(service = %name, "Health probe stopped");
            }
            keep
        });

        for (name, descriptor) in wanted {
            if let Some(task) = tasks.get_mut(name) {
                task.descriptor = descriptor.clone();
                continue;
            }
            let record = Arc::new(ArcSwap::from_pointee(HealthRecord::unknown(name)));
            self.records.insert(name.to_string(), record.clone());
            let handle = self.settings.enabled.then(|| self.spawn_probe(descriptor.clone(), record));
            tasks.insert(
                name.to_string(),
                ProbeTask {
                    descriptor: descriptor.clone(),
                    handle,
                },
            );
        }
    }

    fn spawn_probe(&self, descriptor: Arc<ServiceDescriptor>, record: Arc<ArcSwap<HealthRecord>>) -> JoinHandle<()> {
        let prober = self.prober.clone();
        let settings = self.settings;
        let mut shutdown = self.shutdown.subscribe();

        tracing::debug!(service = %descriptor.name, url = %descriptor.health_url(), "Health probe starting");

        tokio::spawn(async move {
            let mut ticker = time::interval(settings.interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = prober.probe(&descriptor, settings.timeout).await;
                        let previous = record.load();
                        let next = previous.observe(&outcome, &settings.thresholds, Utc::now());
                        if next.status != previous.status {
                            match &outcome {
                                ProbeOutcome::Failure { error, .. } => tracing::warn!(
                                    service = %descriptor.name,
                                    from = previous.status.as_str(),
                                    to = next.status.as_str(),
                                    error = %error,
                                    "Service health changed"
                                ),
                                ProbeOutcome::Success { .. } => tracing::info!(
                                    service = %descriptor.name,
                                    from = previous.status.as_str(),
                                    to = next.status.as_str(),
                                    "Service health changed"
                                ),
                            }
                        }
                        metrics::record_service_health(&descriptor.name, next.status.gauge_value());
                        record.store(Arc::new(next));
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!(service = %descriptor.name, "Health probe received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    pub fn record(&self, service: &str) -> Option<HealthRecord> {
        self.records
            .get(service)
            .map(|r| r.load().as_ref().clone())
    }

    /// Every record, ordered by service name.
    pub fn records(&self) -> Vec<HealthRecord> {
        let mut all: Vec<_> = self
            .records
            .iter()
            .map(|r| r.load().as_ref().clone())
            .collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }

    pub fn fleet(&self) -> FleetHealth {
        let statuses: Vec<_> = self.records.iter().map(|r| r.load().status).collect();
        aggregate(&statuses)
    }

    /// Abort every probe task.
    pub fn stop(&self) {
        for (_, task) in self.tasks.lock().iter_mut() {
            if let Some(handle) = task.handle.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
