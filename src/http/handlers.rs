//! Gateway-local endpoints: liveness, service health and metrics.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::health::{FleetHealth, HealthRecord};
use crate::http::response::{timestamp, ErrorEnvelope, SuccessEnvelope, GATEWAY_VERSION};
use crate::http::server::AppState;
use crate::observability::metrics;

pub const SERVICE_NAME: &str = "api-gateway";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Serialize)]
pub struct GatewayHealth {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub services_count: usize,
}

/// Liveness of the gateway process itself.
pub async fn health(State(state): State<AppState>) -> Json<GatewayHealth> {
    Json(GatewayHealth {
        status: "healthy",
        service: SERVICE_NAME,
        version: GATEWAY_VERSION,
        timestamp: timestamp(),
        services_count: state.gateway.router().snapshot().len(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub service: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FleetReport {
    pub overall: FleetHealth,
    pub services: Vec<HealthRecord>,
}

pub async fn service_health(
    State(state): State<AppState>,
    Query(query): Query<ServiceQuery>,
) -> Result<Response, GatewayError> {
    let health = state.gateway.health();
    match query.service {
        Some(name) => {
            let record = health
                .record(&name)
                .ok_or(GatewayError::UnknownService(name))?;
            Ok(SuccessEnvelope::new(record, "Service health retrieved").into_response())
        }
        None => {
            let report = FleetReport {
                overall: health.fleet(),
                services: health.records(),
            };
            Ok(SuccessEnvelope::new(report, "Fleet health retrieved").into_response())
        }
    }
}

/// Prometheus text exposition.
pub async fn metrics_text(State(state): State<AppState>) -> Response {
    let rendered = if state.gateway.config().observability.metrics_enabled {
        metrics::render()
    } else {
        None
    };
    match rendered {
        Some(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorEnvelope::new(
                "METRICS_DISABLED",
                "Metrics collection is disabled",
                Value::Null,
            )),
        )
            .into_response(),
    }
}

pub async fn metrics_summary() -> SuccessEnvelope<Value> {
    let summary = metrics::summary();
    SuccessEnvelope::new(
        json!({
            "summary": summary,
            "version": GATEWAY_VERSION,
        }),
        "Metrics summary retrieved",
    )
}
