//! Shared harness: a real server on a random port with a known JWT secret.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use parley_server::auth::jwt::Claims;
use parley_server::auth::JwtIdentityResolver;
use parley_server::dm::{MessageStore, SqliteMessageStore};
use parley_server::state::{AppState, HeartbeatConfig};

pub const TEST_SECRET: &[u8] = b"parley-integration-test-secret";

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub base_url: String,
    pub ws_url: String,
    pub state: AppState,
    data_dir: Option<tempfile::TempDir>,
}

/// Start the server with default heartbeat settings.
pub async fn start_test_server() -> TestServer {
    start_test_server_with(HeartbeatConfig::default(), 64).await
}

pub async fn start_test_server_with(heartbeat: HeartbeatConfig, queue_capacity: usize) -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_path = tmp_dir.path().to_str().unwrap().to_string();

    let db = parley_server::db::init_db(&data_path).expect("Failed to init DB");
    let mut server = serve(AppState::new(
        Arc::new(SqliteMessageStore::new(db)),
        Arc::new(JwtIdentityResolver::new(TEST_SECRET)),
        queue_capacity,
        heartbeat,
    ))
    .await;
    server.data_dir = Some(tmp_dir);
    server
}

/// Start the server over a caller-provided message store.
pub async fn start_test_server_with_store(store: Arc<dyn MessageStore>) -> TestServer {
    serve(AppState::new(
        store,
        Arc::new(JwtIdentityResolver::new(TEST_SECRET)),
        64,
        HeartbeatConfig::default(),
    ))
    .await
}

async fn serve(state: AppState) -> TestServer {
    let app = parley_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        ws_url: format!("ws://{}/ws", addr),
        state,
        data_dir: None,
    }
}

/// Mint an access token for `user_id`, valid for an hour.
pub fn token_for(user_id: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    sign(user_id, now, now + 3600)
}

/// Mint a token that expired well outside the default validation leeway.
pub fn expired_token_for(user_id: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    sign(user_id, now - 7200, now - 3600)
}

fn sign(user_id: &str, iat: i64, exp: i64) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        iat,
        exp,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
}

pub async fn connect(server: &TestServer, user_id: &str) -> WsStream {
    let url = format!("{}?token={}", server.ws_url, token_for(user_id));
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("WebSocket connect failed");
    ws
}

/// Next JSON text frame, skipping pings and pongs. Panics on timeout.
pub async fn next_event(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timed out waiting for event")
            .expect("Stream ended")
            .expect("WebSocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {:?}", other),
        }
    }
}

/// Read events until a presence event listing exactly `expected`.
pub async fn wait_for_presence(ws: &mut WsStream, expected: &[&str]) {
    loop {
        let event = next_event(ws).await;
        if event["type"] == "presence" {
            let online: Vec<String> = event["onlineUserIDs"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect();
            if online == expected {
                return;
            }
        }
    }
}

/// Assert no text frame arrives within `wait`.
pub async fn assert_no_event(ws: &mut WsStream, wait: Duration) {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(other) => panic!("Expected no event, got {:?}", other),
        }
    }
}

/// Poll until the registry reports `user_id` offline.
pub async fn wait_until_offline(server: &TestServer, user_id: &str) {
    let user = parley_server::presence::UserId::from(user_id);
    for _ in 0..100 {
        if !server.state.registry.is_online(&user) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} still online", user_id);
}
