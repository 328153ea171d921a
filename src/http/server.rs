//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with local, admin and proxied routes
//! - Wire up middleware (correlation ID, tracing, concurrency limit)
//! - Bind the server to a listener and drain it on shutdown
//!
//! # Design Decisions
//! - Local and admin routes are explicit; everything else falls through to
//!   the request pipeline
//! - The correlation ID layer runs outermost so every span carries it
//! - Proxied bodies are capped by the pipeline, which answers with the error
//!   envelope; `DefaultBodyLimit` caps what admin extractors will read

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    response::Response,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::gateway::Gateway;
use crate::http::handlers;
use crate::http::request::{MakeCorrelationId, X_CORRELATION_ID};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// HTTP front of the gateway.
pub struct GatewayServer {
    gateway: Arc<Gateway>,
    router: Router,
}

impl GatewayServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let router = Self::build_router(gateway.clone());
        Self { gateway, router }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(gateway: Arc<Gateway>) -> Router {
        let config = gateway.config();
        let max_body_size = config.security.max_body_size;
        let max_connections = config.listener.max_connections.max(1);
        let state = AppState { gateway };

        Router::new()
            .route("/health", get(handlers::health))
            .route("/health/services", get(handlers::service_health))
            .route("/metrics", get(handlers::metrics_text))
            .route("/metrics/summary", get(handlers::metrics_summary))
            .merge(setup_admin_router(state.clone()))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_CORRELATION_ID, MakeCorrelationId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_CORRELATION_ID))
                    .layer(ConcurrencyLimitLayer::new(max_connections))
                    .layer(DefaultBodyLimit::max(max_body_size)),
            )
    }

    /// The router without a listener, for in-process tests.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve until the gateway's shutdown signal fires, then drain.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let shutdown = self.gateway.shutdown().clone();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Everything not served locally goes through the pipeline.
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    state.gateway.pipeline().handle(request).await
}
