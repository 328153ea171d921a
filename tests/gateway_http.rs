//! Wire-level tests: real listener, real mock backends, reqwest client.

mod common;

use api_gateway::config::TierLimit;
use api_gateway::routing::{AuthLevel, ServiceDescriptor};
use common::{start_gateway, start_mock_backend, start_programmable_backend, test_config, token};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn ping_service(port: u16) -> ServiceDescriptor {
    ServiceDescriptor::new("ping", "127.0.0.1", port, "/api/ping/", AuthLevel::Public)
}

#[tokio::test]
async fn proxied_request_passes_through_with_gateway_headers() {
    let backend = start_mock_backend("pong").await;
    let mut config = test_config();
    config.services = vec![ping_service(backend.port())];
    let gw = start_gateway(config).await;

    let response = reqwest::Client::new()
        .get(gw.url("/api/ping/latest?page=2"))
        .header("x-correlation-id", "it-1")
        .header("x-user-id", "spoofed")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-correlation-id"], "it-1");
    assert!(response.headers().contains_key("x-gateway-version"));
    assert_eq!(response.text().await.unwrap(), "pong");

    let head = backend.last_request().to_lowercase();
    assert!(head.starts_with("get /latest?page=2 http/1.1"), "{head}");
    assert!(head.contains("x-correlation-id: it-1"));
    assert!(head.contains("x-forwarded-for: 127.0.0.1"));
    assert!(!head.contains("x-user-id"));
}

#[tokio::test]
async fn unknown_route_gets_error_envelope() {
    let gw = start_gateway(test_config()).await;

    let response = reqwest::get(gw.url("/api/nothing/here")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-correlation-id"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "ROUTE_NOT_FOUND");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn health_reports_liveness() {
    let mut config = test_config();
    config.services = vec![ping_service(9)];
    let gw = start_gateway(config).await;

    let body: Value = reqwest::get(gw.url("/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services_count"], 1);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn exhausted_quota_returns_429() {
    let backend = start_mock_backend("ok").await;
    let mut config = test_config();
    config.services = vec![ping_service(backend.port())];
    config.rate_limit.public = TierLimit {
        limit: 2,
        window_secs: 60,
    };
    let gw = start_gateway(config).await;

    for _ in 0..2 {
        let response = reqwest::get(gw.url("/api/ping/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = reqwest::get(gw.url("/api/ping/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn failing_backend_opens_circuit() {
    let backend = start_programmable_backend(|_| async { (500, "boom".to_string()) }).await;
    let mut config = test_config();
    config.services = vec![ping_service(backend.port())];
    config.circuit_breaker.failure_threshold = 2;
    let gw = start_gateway(config).await;

    for _ in 0..2 {
        let response = reqwest::get(gw.url("/api/ping/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
        assert_eq!(body["error"]["details"]["upstream_status"], 500);
    }

    let response = reqwest::get(gw.url("/api/ping/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("retry-after"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CIRCUIT_OPEN");
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn unreachable_backend_is_service_unavailable() {
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = closed.local_addr().unwrap().port();
    drop(closed);

    let mut config = test_config();
    config.services = vec![ping_service(port)];
    let gw = start_gateway(config).await;

    let response = reqwest::get(gw.url("/api/ping/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn protected_route_injects_identity() {
    let backend = start_mock_backend("me").await;
    let mut config = test_config();
    config.services = vec![ServiceDescriptor::new(
        "users",
        "127.0.0.1",
        backend.port(),
        "/api/users/",
        AuthLevel::User,
    )];
    let gw = start_gateway(config).await;
    let client = reqwest::Client::new();

    let response = client.get(gw.url("/api/users/me")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.hits(), 0);

    let response = client
        .get(gw.url("/api/users/me"))
        .bearer_auth(token("user-7", "user"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let head = backend.last_request().to_lowercase();
    assert!(head.contains("x-user-id: user-7"));
    assert!(head.contains("x-user-role: user"));
    assert!(head.contains("x-auth-level: user"));
}

#[tokio::test]
async fn admin_endpoints_require_admin_role() {
    let mut config = test_config();
    config.services = vec![ping_service(9)];
    let gw = start_gateway(config).await;
    let client = reqwest::Client::new();
    let url = gw.url("/admin/circuit-breakers");

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client.get(&url).bearer_auth(token("u", "user")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");

    let response = client.get(&url).bearer_auth(token("root", "admin")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["circuit_breakers"][0]["service"], "ping");
    assert_eq!(body["data"]["circuit_breakers"][0]["state"], "CLOSED");
}

#[tokio::test]
async fn admin_reset_closes_an_open_circuit() {
    let backend = start_programmable_backend(|_| async { (503, "down".to_string()) }).await;
    let mut config = test_config();
    config.services = vec![ping_service(backend.port())];
    config.circuit_breaker.failure_threshold = 1;
    let gw = start_gateway(config).await;
    let client = reqwest::Client::new();
    let admin = token("root", "admin");

    let response = client.get(gw.url("/api/ping/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let response = client.get(gw.url("/api/ping/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = client
        .post(gw.url("/admin/circuit-breaker/ghost/reset"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SERVICE_NOT_FOUND");

    for _ in 0..2 {
        let response = client
            .post(gw.url("/admin/circuit-breaker/ping/reset"))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["data"]["state"], "CLOSED");
        assert_eq!(body["data"]["consecutive_failures"], 0);
    }

    let before = backend.hits();
    client.get(gw.url("/api/ping/")).send().await.unwrap();
    assert_eq!(backend.hits(), before + 1);
}

#[tokio::test]
async fn admin_route_update_is_atomic() {
    let old = start_mock_backend("old").await;
    let new = start_mock_backend("new").await;
    let mut config = test_config();
    config.services = vec![ping_service(old.port())];
    let gw = start_gateway(config).await;
    let client = reqwest::Client::new();
    let admin = token("root", "admin");

    let conflicting = json!({
        "services": [
            {"name": "a", "host": "127.0.0.1", "port": new.port(), "path_prefix": "/api/v2/", "auth_level": "public"},
            {"name": "b", "host": "127.0.0.1", "port": new.port(), "path_prefix": "/api/v2", "auth_level": "public"}
        ]
    });
    let response = client
        .put(gw.url("/admin/routes"))
        .bearer_auth(&admin)
        .json(&conflicting)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let text = reqwest::get(gw.url("/api/ping/")).await.unwrap().text().await.unwrap();
    assert_eq!(text, "old");

    let replacement = json!({
        "services": [
            {"name": "v2", "host": "127.0.0.1", "port": new.port(), "path_prefix": "/api/v2/", "auth_level": "public"}
        ]
    });
    let response = client
        .put(gw.url("/admin/routes"))
        .bearer_auth(&admin)
        .json(&replacement)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["version"], 2);
    assert_eq!(body["data"]["total_count"], 1);

    let response = reqwest::get(gw.url("/api/ping/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let text = reqwest::get(gw.url("/api/v2/x")).await.unwrap().text().await.unwrap();
    assert_eq!(text, "new");

    let response = client
        .get(gw.url("/admin/routes"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["routes"][0]["service"], "v2");
}

#[tokio::test]
async fn malformed_route_update_is_rejected() {
    let mut config = test_config();
    config.services = vec![ping_service(9)];
    let gw = start_gateway(config).await;

    let response = reqwest::Client::new()
        .put(gw.url("/admin/routes"))
        .bearer_auth(token("root", "admin"))
        .json(&json!({"services": [{"name": "x"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(gw.gateway.router().snapshot().version(), 1);
}

#[tokio::test]
async fn oversized_body_is_rejected_before_the_backend() {
    let backend = start_mock_backend("pong").await;
    let mut config = test_config();
    config.security.max_body_size = 16;
    config.services = vec![ping_service(backend.port())];
    let gw = start_gateway(config).await;

    let response = reqwest::Client::new()
        .post(gw.url("/api/ping/upload"))
        .body(vec![b'a'; 64])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(response.headers().contains_key("x-correlation-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn registered_service_is_routed_and_health_tracked() {
    let backend = start_mock_backend("added").await;
    let mut config = test_config();
    config.services = vec![ping_service(9)];
    let gw = start_gateway(config).await;
    let client = reqwest::Client::new();
    let admin = token("root", "admin");

    let response = client
        .post(gw.url("/admin/routes"))
        .bearer_auth(&admin)
        .json(&json!({
            "name": "extra", "host": "127.0.0.1", "port": backend.port(),
            "path_prefix": "/api/extra/", "auth_level": "public"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["version"], 2);
    assert_eq!(body["data"]["total_count"], 2);

    let text = reqwest::get(gw.url("/api/extra/x")).await.unwrap().text().await.unwrap();
    assert_eq!(text, "added");
    assert!(gw.gateway.health().record("extra").is_some());

    // Same prefix again is a conflict and changes nothing.
    let response = client
        .post(gw.url("/admin/routes"))
        .bearer_auth(&admin)
        .json(&json!({
            "name": "dup", "host": "127.0.0.1", "port": 9,
            "path_prefix": "/api/extra/", "auth_level": "public"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(gw.gateway.router().snapshot().version(), 2);
}
