//! Header manipulation and identity propagation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip client-supplied identity headers, inject verified ones
//! - Append X-Forwarded-For / X-Forwarded-Proto for upstreams
//! - Resolve the client address used for rate limiting
//!
//! # Design Decisions
//! - Never trust existing identity headers from clients
//! - X-Forwarded-For is trusted only when explicitly configured

use std::net::{IpAddr, SocketAddr};

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::routing::descriptor::AuthLevel;
use crate::security::auth::Claims;

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");
pub const X_AUTH_LEVEL: HeaderName = HeaderName::from_static("x-auth-level");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Drop identity headers a client may have forged.
pub fn strip_identity(headers: &mut HeaderMap) {
    headers.remove(X_USER_ID);
    headers.remove(X_USER_ROLE);
    headers.remove(X_AUTH_LEVEL);
}

/// Inject identity derived from verified claims.
pub fn inject_identity(headers: &mut HeaderMap, claims: &Claims, level: AuthLevel) {
    if let Ok(value) = HeaderValue::from_str(&claims.sub) {
        headers.insert(X_USER_ID, value);
    }
    if let Some(role) = claims.primary_role() {
        if let Ok(value) = HeaderValue::from_str(role) {
            headers.insert(X_USER_ROLE, value);
        }
    }
    headers.insert(X_AUTH_LEVEL, HeaderValue::from_static(level.as_str()));
}

/// Append the client address to X-Forwarded-For and set X-Forwarded-Proto.
pub fn append_forwarded(headers: &mut HeaderMap, client: Option<SocketAddr>) {
    if let Some(addr) = client {
        let ip = addr.ip().to_string();
        let chain = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
            _ => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
    if !headers.contains_key(&X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
}

/// The address a request is attributed to.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Option<IpAddr> {
    if trust_forwarded_for {
        let first_hop = headers
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if first_hop.is_some() {
            return first_hop;
        }
    }
    peer.map(|addr| addr.ip())
}
