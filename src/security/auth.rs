//! Bearer token verification and role gating.
//!
//! # Responsibilities
//! - Extract the bearer token from the Authorization header
//! - Verify HS256 signature, expiry, issuer and audience
//! - Enforce the auth level a route requires
//!
//! # Design Decisions
//! - The gateway only verifies; tokens are issued by the auth service
//! - Public routes verify opportunistically and ignore bad tokens
//! - Expiry is reported separately so clients know to refresh

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::routing::descriptor::AuthLevel;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SYSTEM: &str = "system";

/// Claims the gateway understands. Unknown claims are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Legacy admin flag still set by older tokens.
    #[serde(default)]
    pub is_admin: bool,
}

impl Claims {
    pub fn has_role(&self, wanted: &str) -> bool {
        self.role.as_deref() == Some(wanted)
            || self.roles.iter().any(|r| r == wanted)
            || (wanted == ROLE_ADMIN && self.is_admin)
    }

    /// Role reported to upstreams in X-User-Role.
    pub fn primary_role(&self) -> Option<&str> {
        self.role
            .as_deref()
            .or_else(|| self.roles.first().map(String::as_str))
            .or(if self.is_admin { Some(ROLE_ADMIN) } else { None })
    }
}

/// Verifies tokens against the shared secret.
pub struct AuthGate {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl AuthGate {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Gate a request at `level`.
    ///
    /// Returns the verified claims when a valid token was presented. On public
    /// routes an invalid token is treated as no token at all.
    pub fn check(&self, level: AuthLevel, headers: &HeaderMap) -> Result<Option<Claims>, GatewayError> {
        let token = bearer_token(headers);

        if level == AuthLevel::Public {
            return Ok(token.and_then(|t| self.verify(t).ok()));
        }

        let result = token
            .ok_or(GatewayError::Unauthenticated {
                reason: "Missing bearer token",
            })
            .and_then(|t| self.verify(t))
            .and_then(|claims| authorize(level, &claims).map(|_| claims));

        match &result {
            Ok(_) => metrics::record_auth_attempt("success"),
            Err(GatewayError::TokenExpired) => metrics::record_auth_attempt("expired"),
            Err(GatewayError::Unauthorized { .. }) => metrics::record_auth_attempt("forbidden"),
            Err(_) => metrics::record_auth_attempt("failure"),
        }
        result.map(Some)
    }

    /// Verify signature and registered claims.
    pub fn verify(&self, token: &str) -> Result<Claims, GatewayError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => GatewayError::TokenExpired,
                _ => {
                    tracing::debug!(error = %err, "Token rejected");
                    GatewayError::Unauthenticated {
                        reason: "Invalid token",
                    }
                }
            })
    }
}

fn authorize(level: AuthLevel, claims: &Claims) -> Result<(), GatewayError> {
    let allowed = match level {
        AuthLevel::Public | AuthLevel::User => true,
        AuthLevel::Admin => claims.has_role(ROLE_ADMIN) || claims.has_role(ROLE_SYSTEM),
        AuthLevel::System => claims.has_role(ROLE_SYSTEM),
    };
    if allowed {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized {
            required: level.as_str(),
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn gate() -> AuthGate {
        AuthGate::new(&AuthConfig {
            jwt_secret: SECRET.into(),
            ..AuthConfig::default()
        })
    }

    fn token(role: Option<&str>, exp_offset: i64) -> String {
        let claims = Claims {
            sub: "user-1".into(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iat: None,
            role: role.map(String::from),
            roles: vec![],
            is_admin: false,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn user_token_on_admin_route_is_forbidden() {
        let err = gate()
            .check(AuthLevel::Admin, &headers(&token(Some("user"), 3600)))
            .unwrap_err();
        assert_eq!(err, GatewayError::Unauthorized { required: "admin" });
    }

    #[test]
    fn missing_token_is_unauthenticated() {
        let err = gate().check(AuthLevel::User, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated { .. }));
    }

    #[test]
    fn expired_token_is_reported() {
        let err = gate()
            .check(AuthLevel::User, &headers(&token(None, -3600)))
            .unwrap_err();
        assert_eq!(err, GatewayError::TokenExpired);
    }

    #[test]
    fn wrong_signature_is_unauthenticated() {
        let claims = Claims {
            sub: "x".into(),
            exp: chrono::Utc::now().timestamp() + 3600,
            iat: None,
            role: Some("admin".into()),
            roles: vec![],
            is_admin: false,
        };
        let forged = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"other")).unwrap();
        let err = gate().check(AuthLevel::Admin, &headers(&forged)).unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated { .. }));
    }

    #[test]
    fn admin_and_system_roles() {
        let gate = gate();
        assert!(gate.check(AuthLevel::Admin, &headers(&token(Some("admin"), 60))).is_ok());
        assert!(gate.check(AuthLevel::Admin, &headers(&token(Some("system"), 60))).is_ok());
        assert!(gate.check(AuthLevel::System, &headers(&token(Some("admin"), 60))).is_err());
        assert!(gate.check(AuthLevel::System, &headers(&token(Some("system"), 60))).is_ok());
    }

    #[test]
    fn legacy_admin_flag_counts() {
        let claims = Claims {
            sub: "ops".into(),
            exp: chrono::Utc::now().timestamp() + 60,
            iat: None,
            role: None,
            roles: vec![],
            is_admin: true,
        };
        assert!(claims.has_role(ROLE_ADMIN));
        assert_eq!(claims.primary_role(), Some("admin"));
    }

    #[test]
    fn public_routes_ignore_bad_tokens() {
        let gate = gate();
        assert_eq!(gate.check(AuthLevel::Public, &headers("garbage")).unwrap(), None);
        let claims = gate
            .check(AuthLevel::Public, &headers(&token(None, 60)))
            .unwrap()
            .unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
