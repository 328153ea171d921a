//! Admin API.
//!
//! # Endpoints
//! - `GET  /admin/circuit-breakers`
//! - `POST /admin/circuit-breaker/{service}/reset`
//! - `GET  /admin/routes`
//! - `PUT  /admin/routes`
//! - `POST /admin/routes`
//!
//! Every endpoint sits behind the admin token check.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/circuit-breakers", get(list_breakers))
        .route("/admin/circuit-breaker/{service}/reset", post(reset_breaker))
        .route("/admin/routes", get(list_routes).put(replace_routes).post(register_route))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
