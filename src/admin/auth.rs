//! Admin authentication.
//!
//! Admin endpoints require a verified token at the admin level. Tokens are
//! issued by the external auth service; the gateway only verifies them.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::GatewayError;
use crate::http::server::AppState;
use crate::routing::AuthLevel;

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let claims = state
        .gateway
        .auth()
        .check(AuthLevel::Admin, request.headers())?;

    if let Some(claims) = &claims {
        tracing::info!(
            admin = %claims.sub,
            method = %request.method(),
            path = %request.uri().path(),
            "Admin request"
        );
    }

    Ok(next.run(request).await)
}
