//! Admin operations on breakers and routes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::http::response::SuccessEnvelope;
use crate::http::server::AppState;
use crate::resilience::circuit_breaker::BreakerSnapshot;
use crate::routing::table::{RouteSummary, RouteTable};
use crate::routing::ServiceDescriptor;

#[derive(Debug, Serialize)]
pub struct BreakerList {
    pub circuit_breakers: Vec<BreakerSnapshot>,
    pub total: usize,
}

pub async fn list_breakers(State(state): State<AppState>) -> SuccessEnvelope<BreakerList> {
    let circuit_breakers = state.gateway.breaker().snapshots();
    SuccessEnvelope::new(
        BreakerList {
            total: circuit_breakers.len(),
            circuit_breakers,
        },
        "Circuit breaker states retrieved",
    )
}

pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<SuccessEnvelope<BreakerSnapshot>, GatewayError> {
    let breaker = state.gateway.breaker();
    if !breaker.force_reset(&service) {
        return Err(GatewayError::UnknownService(service));
    }
    let snapshot = breaker
        .snapshot(&service)
        .ok_or(GatewayError::UnknownService(service.clone()))?;
    Ok(SuccessEnvelope::new(
        snapshot,
        format!("Circuit breaker for {service} reset"),
    ))
}

#[derive(Debug, Serialize)]
pub struct RouteListing {
    pub version: u64,
    pub routes: Vec<RouteSummary>,
    pub total_count: usize,
}

impl From<&RouteTable> for RouteListing {
    fn from(table: &RouteTable) -> Self {
        let routes = table.summaries();
        Self {
            version: table.version(),
            total_count: routes.len(),
            routes,
        }
    }
}

pub async fn list_routes(State(state): State<AppState>) -> SuccessEnvelope<RouteListing> {
    let table = state.gateway.router().snapshot();
    SuccessEnvelope::new(RouteListing::from(table.as_ref()), "Routes retrieved")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteUpdate {
    pub services: Vec<ServiceDescriptor>,
}

pub async fn replace_routes(
    State(state): State<AppState>,
    body: Result<Json<RouteUpdate>, JsonRejection>,
) -> Result<SuccessEnvelope<RouteListing>, GatewayError> {
    let Json(update) = body.map_err(|rejection| GatewayError::InvalidRouteUpdate {
        problems: vec![rejection.body_text()],
    })?;
    let table = state.gateway.apply_routes(update.services)?;
    Ok(SuccessEnvelope::new(
        RouteListing::from(table.as_ref()),
        "Route table replaced",
    ))
}

/// Add one service without touching the others.
pub async fn register_route(
    State(state): State<AppState>,
    body: Result<Json<ServiceDescriptor>, JsonRejection>,
) -> Result<SuccessEnvelope<RouteListing>, GatewayError> {
    let Json(descriptor) = body.map_err(|rejection| GatewayError::InvalidRouteUpdate {
        problems: vec![rejection.body_text()],
    })?;
    let name = descriptor.name.clone();
    let table = state.gateway.register_route(descriptor)?;
    Ok(SuccessEnvelope::new(
        RouteListing::from(table.as_ref()),
        format!("Service {name} registered"),
    ))
}
