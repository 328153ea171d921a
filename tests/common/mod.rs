//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use api_gateway::{Gateway, GatewayConfig, GatewayServer, Shutdown};
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const SECRET: &str = "integration-test-secret";

/// A running mock backend and what it has seen.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Request heads received so far (request line plus headers).
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> String {
        self.requests.lock().last().cloned().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut body_read = buf.len() - head_end;
    while body_read < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body_read += n;
    }
    Some(head)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` receives the request head and returns status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let f = Arc::new(f);
    let seen = backend.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let Some(head) = read_request(&mut socket).await else {
                    return;
                };
                seen.hits.fetch_add(1, Ordering::SeqCst);
                seen.requests.lock().push(head.clone());

                let (status, body) = f(head).await;
                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    reason(status),
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    backend
}

/// Start a mock backend that always answers 200 with `body`.
pub async fn start_mock_backend(body: &'static str) -> MockBackend {
    start_programmable_backend(move |_| async move { (200, body.to_string()) }).await
}

/// An HS256 token as the external auth service would issue it.
pub fn token(sub: &str, role: &str) -> String {
    let claims = json!({
        "sub": sub,
        "role": role,
        "exp": chrono::Utc::now().timestamp() + 3_600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Config with the test secret, health probes off and a single fast retry.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.auth.jwt_secret = SECRET.to_string();
    config.health_check.enabled = false;
    config.retries.max_attempts = 1;
    config
}

/// A gateway serving on an ephemeral port.
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.gateway.stop();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> RunningGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = Arc::new(Gateway::from_config(config, Shutdown::new()).unwrap());
    let server = GatewayServer::new(gateway.clone());
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });
    RunningGateway { addr, gateway }
}
