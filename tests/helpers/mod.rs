//! Shared test helpers for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use lumen_api::AppState;
use lumen_auth::PasswordHasher;
use lumen_cache::StoreManager;
use lumen_cache::memory::{MemoryPubSub, MemoryStore};
use lumen_core::config::{AccountConfig, AppConfig};
use lumen_core::types::{Guard, ProcessId, SubjectId};

/// Password of every test account.
pub const PASSWORD: &str = "correct horse battery staple";

/// Subject of `alice` (api and admin).
pub const ALICE: SubjectId = SubjectId(1);
/// Subject of `bob` (api only).
pub const BOB: SubjectId = SubjectId(2);

pub type TestSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared state, including the started engine
    pub state: AppState,
}

/// Fresh in-memory store and pub/sub, shared by every node built on it.
pub fn memory_stores() -> StoreManager {
    StoreManager::from_providers(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryPubSub::new(256)),
    )
}

/// Configuration with two accounts and a fixed secret.
pub fn test_config() -> AppConfig {
    static HASH: OnceLock<String> = OnceLock::new();
    let hash = HASH
        .get_or_init(|| {
            PasswordHasher::new()
                .hash_password(PASSWORD)
                .expect("Failed to hash test password")
        })
        .clone();

    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.auth.accounts = vec![
        AccountConfig {
            username: "alice".to_string(),
            password_hash: hash.clone(),
            subject_id: ALICE,
            guards: vec![Guard::Api, Guard::Admin],
        },
        AccountConfig {
            username: "bob".to_string(),
            password_hash: hash,
            subject_id: BOB,
            guards: vec![Guard::Api],
        },
    ];
    config
}

impl TestApp {
    /// Create a single-node test application
    pub async fn new() -> Self {
        Self::on(memory_stores(), "node-a").await
    }

    /// Create a node named `process` on shared stores
    pub async fn on(stores: StoreManager, process: &str) -> Self {
        let process_id = ProcessId::new(process).expect("Invalid process id");
        let state = lumen_api::build_state(test_config(), stores, process_id);
        state.engine.start().await.expect("Failed to start engine");
        let router = lumen_api::build_router(state.clone());
        Self { router, state }
    }

    /// Send a request through the router
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();
        self.request_raw(method, path, body_str, token).await
    }

    /// Send a request with a body that is passed through untouched
    pub async fn request_raw(
        &self,
        method: &str,
        path: &str,
        body: String,
        token: Option<&str>,
    ) -> TestResponse {
        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json");

        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let req = req.body(Body::from(body)).expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");
        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }

    /// Log in on `surface` (`api`, `admin` or `open`) and return the credential
    pub async fn login(&self, surface: &str, username: &str) -> String {
        let response = self
            .request(
                "POST",
                &format!("/{surface}/v1/auth/login"),
                Some(serde_json::json!({
                    "username": username,
                    "password": PASSWORD,
                    "platform": "test",
                })),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {:?}", response.body);
        response.body["data"]["access_token"]
            .as_str()
            .expect("Missing access_token")
            .to_string()
    }

    /// Mint a credential without a login, so no login notice is published
    pub fn issue(&self, subject: SubjectId, guard: Guard) -> String {
        self.state
            .sessions
            .issue(subject, guard)
            .expect("Failed to issue credential")
            .token
    }

    /// Serve the router on an ephemeral port for WebSocket tests
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("No local addr");
        let router = self.router.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}

/// Open a socket and wait until the server is serving it.
pub async fn connect_ws(addr: SocketAddr, token: &str, instance: &str) -> TestSocket {
    let url = format!("ws://{addr}/ws?token={token}&instance={instance}");
    let (mut socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("WebSocket handshake failed");

    // A pong proves the connection is registered.
    send_text(&mut socket, r#"{"event":"ping"}"#).await;
    assert_eq!(next_text(&mut socket).await, r#"{"event":"pong"}"#);
    socket
}

pub async fn send_text(socket: &mut TestSocket, text: &str) {
    futures::SinkExt::send(socket, Message::text(text))
        .await
        .expect("Failed to send frame");
}

/// Next text frame, skipping protocol frames.
pub async fn next_text(socket: &mut TestSocket) -> String {
    loop {
        match next_message(socket).await {
            Some(Message::Text(text)) => return text.as_str().to_owned(),
            Some(Message::Close(frame)) => panic!("socket closed: {frame:?}"),
            Some(_) => continue,
            None => panic!("socket ended"),
        }
    }
}

/// Wait for the close frame, returning its code.
pub async fn next_close(socket: &mut TestSocket) -> Option<u16> {
    loop {
        match next_message(socket).await {
            Some(Message::Close(frame)) => return frame.map(|f| u16::from(f.code)),
            Some(_) => continue,
            None => return None,
        }
    }
}

async fn next_message(socket: &mut TestSocket) -> Option<Message> {
    tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("Timed out waiting for a frame")
        .map(|r| r.expect("WebSocket error"))
}
