//! Gateway assembly.
//!
//! # Responsibilities
//! - Build every subsystem from one validated configuration
//! - Apply route updates atomically and keep per-service state aligned
//! - Start and stop background tasks
//!
//! # Design Decisions
//! - The upstream and the prober are injected so tests run without sockets
//! - A rejected route update leaves the table and breaker state untouched
//! - One update lock spans the table swap and the alignment that follows,
//!   so per-service state always matches the live table
//! - Breaker and health state survive updates for services that remain

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::health::{HealthMonitor, HttpProber, Prober};
use crate::lifecycle::Shutdown;
use crate::pipeline::{PipelineSettings, RequestPipeline};
use crate::proxy::{HyperUpstream, ProxyForwarder, Upstream};
use crate::resilience::{BreakerSettings, CircuitBreaker, RetryPolicy};
use crate::routing::{RouteError, RouteTable, Router, ServiceDescriptor};
use crate::security::{AuthGate, RateLimiter};

pub struct Gateway {
    config: GatewayConfig,
    router: Arc<Router>,
    auth: Arc<AuthGate>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthMonitor>,
    upstream: Arc<dyn Upstream>,
    pipeline: RequestPipeline,
    shutdown: Shutdown,
    updates: Mutex<()>,
}

impl Gateway {
    /// Gateway talking to real backends over HTTP.
    pub fn from_config(config: GatewayConfig, shutdown: Shutdown) -> Result<Self, GatewayError> {
        let upstream = Arc::new(HyperUpstream::new(&config.timeouts));
        Self::with_parts(config, upstream, Arc::new(HttpProber::new()), shutdown)
    }

    /// Gateway with a custom upstream and prober.
    ///
    /// Must be called inside a Tokio runtime: health probes start immediately.
    pub fn with_parts(
        config: GatewayConfig,
        upstream: Arc<dyn Upstream>,
        prober: Arc<dyn Prober>,
        shutdown: Shutdown,
    ) -> Result<Self, GatewayError> {
        let router = Arc::new(
            Router::from_services(config.services.clone())
                .map_err(|e| GatewayError::InternalConfigError(e.to_string()))?,
        );
        let auth = Arc::new(AuthGate::new(&config.auth));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let breaker = Arc::new(CircuitBreaker::new(BreakerSettings::from(&config.circuit_breaker)));
        let health = Arc::new(HealthMonitor::new(&config.health_check, prober, shutdown.sender()));

        let forwarder = ProxyForwarder::new(upstream.clone(), breaker.clone(), RetryPolicy::from(&config.retries));
        let pipeline = RequestPipeline::new(
            router.clone(),
            auth.clone(),
            limiter.clone(),
            breaker.clone(),
            forwarder,
            PipelineSettings::from(&config),
        );

        let gateway = Self {
            config,
            router,
            auth,
            limiter,
            breaker,
            health,
            upstream,
            pipeline,
            shutdown,
            updates: Mutex::new(()),
        };
        gateway.align_services(&gateway.router.snapshot());

        tracing::info!(
            services = gateway.router.snapshot().len(),
            rate_limit = gateway.limiter.is_enabled(),
            "Gateway initialized"
        );
        Ok(gateway)
    }

    /// Replace the route table.
    ///
    /// Validation runs before the swap; on error nothing changes.
    pub fn apply_routes(&self, services: Vec<ServiceDescriptor>) -> Result<Arc<RouteTable>, GatewayError> {
        let _update = self.updates.lock();
        let table = self.router.update(services).map_err(invalid_update)?;
        self.align_services(&table);
        Ok(table)
    }

    /// Add one service to the live table.
    pub fn register_route(&self, descriptor: ServiceDescriptor) -> Result<Arc<RouteTable>, GatewayError> {
        let _update = self.updates.lock();
        let table = self.router.register(descriptor).map_err(invalid_update)?;
        self.align_services(&table);
        Ok(table)
    }

    fn align_services(&self, table: &RouteTable) {
        let descriptors: Vec<_> = table.services().cloned().collect();
        let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        self.breaker.sync_services(names.iter().copied());
        self.upstream.retain_services(&names);
        self.health.sync(&descriptors);
    }

    /// Spawn the rate limit sweeper.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if self.limiter.is_enabled() {
            let interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs.max(1));
            handles.push(tokio::spawn(
                self.limiter.clone().run_sweeper(interval, self.shutdown.subscribe()),
            ));
        }
        handles
    }

    /// Apply the service list of every reloaded configuration until shutdown.
    ///
    /// Other sections need a restart.
    pub async fn follow_config(self: Arc<Self>, mut updates: mpsc::UnboundedReceiver<GatewayConfig>) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                update = updates.recv() => {
                    let Some(config) = update else { break };
                    match self.apply_routes(config.services) {
                        Ok(table) => tracing::info!(
                            version = table.version(),
                            routes = table.len(),
                            "Reloaded services from config file"
                        ),
                        Err(e) => tracing::error!(error = %e, "Reloaded services rejected, keeping current routes"),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Config reload loop stopped");
    }

    /// Stop health probes and signal every subscriber.
    pub fn stop(&self) {
        self.shutdown.trigger();
        self.health.stop();
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }
}

fn invalid_update(err: RouteError) -> GatewayError {
    let problems = match err {
        RouteError::Invalid(errors) => errors.iter().map(ToString::to_string).collect(),
        other => vec![other.to_string()],
    };
    GatewayError::InvalidRouteUpdate { problems }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Response;

    use crate::health::{HealthStatus, ProbeOutcome};
    use crate::proxy::{UpstreamFailure, UpstreamRequest};
    use crate::resilience::CircuitState;
    use crate::routing::AuthLevel;

    struct Down;

    #[async_trait]
    impl Upstream for Down {
        async fn send(
            &self,
            _service: &ServiceDescriptor,
            _request: UpstreamRequest,
            _timeout: Duration,
        ) -> Result<Response<Body>, UpstreamFailure> {
            Err(UpstreamFailure::Connect("refused".into()))
        }
    }

    struct AlwaysUp;

    #[async_trait]
    impl Prober for AlwaysUp {
        async fn probe(&self, _service: &ServiceDescriptor, _timeout: Duration) -> ProbeOutcome {
            ProbeOutcome::Success {
                latency: Duration::from_millis(5),
            }
        }
    }

    fn service(name: &str, prefix: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name, "127.0.0.1", 9000, prefix, AuthLevel::Public)
    }

    fn gateway() -> Gateway {
        let mut config = GatewayConfig::default();
        config.services = vec![service("auth", "/api/auth/"), service("news", "/api/news/")];
        config.circuit_breaker.failure_threshold = 1;
        Gateway::with_parts(config, Arc::new(Down), Arc::new(AlwaysUp), Shutdown::new()).unwrap()
    }

    #[tokio::test]
    async fn startup_registers_breakers_and_health() {
        let gateway = gateway();
        assert_eq!(gateway.breaker().state("auth"), Some(CircuitState::Closed));
        assert_eq!(gateway.health().records().len(), 2);
        gateway.stop();
    }

    #[tokio::test]
    async fn rejected_update_keeps_state() {
        let gateway = gateway();
        gateway.breaker().admit("news").unwrap().failure();
        assert_eq!(gateway.breaker().state("news"), Some(CircuitState::Open));

        let err = gateway
            .apply_routes(vec![service("a", "/api/x/"), service("b", "/api/x")])
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 400);
        assert_eq!(gateway.router().snapshot().version(), 1);
        assert_eq!(gateway.breaker().state("news"), Some(CircuitState::Open));
        gateway.stop();
    }

    #[tokio::test]
    async fn accepted_update_aligns_services() {
        let gateway = gateway();
        gateway.breaker().admit("news").unwrap().failure();

        let table = gateway
            .apply_routes(vec![service("news", "/api/news/"), service("users", "/api/users/")])
            .unwrap();
        assert_eq!(table.version(), 2);
        assert_eq!(gateway.breaker().state("auth"), None);
        assert_eq!(gateway.breaker().state("users"), Some(CircuitState::Closed));
        // Surviving services keep their breaker state.
        assert_eq!(gateway.breaker().state("news"), Some(CircuitState::Open));
        assert!(gateway.health().record("auth").is_none());
        assert!(matches!(
            gateway.health().record("users").map(|r| r.status),
            Some(HealthStatus::Unknown | HealthStatus::Healthy)
        ));
        gateway.stop();
    }

    #[tokio::test]
    async fn registered_route_gets_breaker_and_health() {
        let gateway = gateway();
        let table = gateway.register_route(service("users", "/api/users/")).unwrap();
        assert_eq!(table.version(), 2);
        assert_eq!(gateway.breaker().state("users"), Some(CircuitState::Closed));
        assert!(gateway.health().record("users").is_some());

        let err = gateway.register_route(service("other", "/api/users/")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(gateway.router().snapshot().version(), 2);
        gateway.stop();
    }

    #[test]
    fn concurrent_updates_leave_state_matching_the_table() {
        let mut config = GatewayConfig::default();
        config.health_check.enabled = false;
        config.services = vec![service("auth", "/api/auth/")];
        let gateway = Arc::new(
            Gateway::with_parts(config, Arc::new(Down), Arc::new(AlwaysUp), Shutdown::new()).unwrap(),
        );

        for i in 0..300 {
            let writers: Vec<_> = ["x", "y"]
                .into_iter()
                .map(|tag| {
                    let gateway = gateway.clone();
                    let name = format!("{tag}{i}");
                    std::thread::spawn(move || {
                        gateway.apply_routes(vec![service(&name, "/api/")]).unwrap();
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }

            let table = gateway.router().snapshot();
            let live: Vec<String> = table.services().map(|d| d.name.clone()).collect();
            let health: Vec<String> = gateway.health().records().into_iter().map(|r| r.service).collect();
            let breakers: Vec<String> = gateway.breaker().snapshots().into_iter().map(|s| s.service).collect();
            assert_eq!(live, health, "iteration {i}");
            assert_eq!(live, breakers, "iteration {i}");
        }
    }

    #[tokio::test]
    async fn reloaded_config_replaces_services() {
        let gateway = Arc::new(gateway());
        let (tx, rx) = mpsc::unbounded_channel();
        let follower = tokio::spawn(gateway.clone().follow_config(rx));

        let mut next = GatewayConfig::default();
        next.services = vec![service("search", "/api/search/")];
        tx.send(next).unwrap();
        drop(tx);
        follower.await.unwrap();

        let table = gateway.router().snapshot();
        assert_eq!(table.version(), 2);
        assert!(table.service("search").is_some());
        assert!(table.service("auth").is_none());
        gateway.stop();
    }
}
