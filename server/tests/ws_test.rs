//! Integration tests for WebSocket admission, presence announcements and heartbeat.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use common::*;
use parley_server::presence::UserId;
use parley_server::state::HeartbeatConfig;

/// Expect the server to close the socket with `code` before anything else.
async fn expect_close_code(ws: &mut WsStream, code: u16) {
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("Timed out waiting for close")
        .expect("Stream ended")
        .expect("WebSocket error");
    match frame {
        Message::Close(Some(close)) => assert_eq!(u16::from(close.code), code),
        other => panic!("Expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn connect_announces_presence_to_self() {
    let server = start_test_server().await;
    let mut alice = connect(&server, "alice").await;

    wait_for_presence(&mut alice, &["alice"]).await;
    assert!(server.state.registry.is_online(&UserId::from("alice")));
}

#[tokio::test]
async fn both_users_see_each_other_online() {
    let server = start_test_server().await;
    let mut alice = connect(&server, "alice").await;
    wait_for_presence(&mut alice, &["alice"]).await;

    let mut bob = connect(&server, "bob").await;
    wait_for_presence(&mut bob, &["alice", "bob"]).await;
    wait_for_presence(&mut alice, &["alice", "bob"]).await;
}

#[tokio::test]
async fn disconnect_announces_user_offline() {
    let server = start_test_server().await;
    let mut alice = connect(&server, "alice").await;
    let mut bob = connect(&server, "bob").await;
    wait_for_presence(&mut bob, &["alice", "bob"]).await;

    alice.close(None).await.unwrap();

    wait_for_presence(&mut bob, &["bob"]).await;
    wait_until_offline(&server, "alice").await;
}

#[tokio::test]
async fn user_stays_online_until_last_connection_closes() {
    let server = start_test_server().await;
    let mut phone = connect(&server, "alice").await;
    let mut laptop = connect(&server, "alice").await;
    let mut bob = connect(&server, "bob").await;
    wait_for_presence(&mut bob, &["alice", "bob"]).await;

    phone.close(None).await.unwrap();
    // Presence is announced again but alice is still listed
    wait_for_presence(&mut bob, &["alice", "bob"]).await;
    assert!(server.state.registry.is_online(&UserId::from("alice")));

    laptop.close(None).await.unwrap();
    wait_for_presence(&mut bob, &["bob"]).await;
}

#[tokio::test]
async fn invalid_token_is_closed_with_4002() {
    let server = start_test_server().await;
    let url = format!("{}?token=not-a-jwt", server.ws_url);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    expect_close_code(&mut ws, 4002).await;
    assert!(server.state.registry.online_user_ids().is_empty());
    assert_eq!(server.state.connections.session_count(), 0);
}

#[tokio::test]
async fn missing_token_is_closed_with_4002() {
    let server = start_test_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.ws_url.clone())
        .await
        .unwrap();

    expect_close_code(&mut ws, 4002).await;
    assert!(server.state.registry.online_user_ids().is_empty());
}

#[tokio::test]
async fn expired_token_is_closed_with_4001() {
    let server = start_test_server().await;
    let url = format!("{}?token={}", server.ws_url, expired_token_for("alice"));
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    expect_close_code(&mut ws, 4001).await;
    assert!(!server.state.registry.is_online(&UserId::from("alice")));
}

#[tokio::test]
async fn rejected_connection_is_not_announced() {
    let server = start_test_server().await;
    let mut bob = connect(&server, "bob").await;
    wait_for_presence(&mut bob, &["bob"]).await;

    let url = format!("{}?token=garbage", server.ws_url);
    let (mut intruder, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    expect_close_code(&mut intruder, 4002).await;

    assert_no_event(&mut bob, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn token_cookie_is_accepted() {
    let server = start_test_server().await;
    let mut request = server.ws_url.clone().into_client_request().unwrap();
    let cookie = format!("jwt={}", token_for("alice"));
    let _ = request
        .headers_mut()
        .insert("Cookie", HeaderValue::from_str(&cookie).unwrap());

    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    wait_for_presence(&mut ws, &["alice"]).await;
}

#[tokio::test]
async fn client_text_frames_are_ignored() {
    let server = start_test_server().await;
    let mut alice = connect(&server, "alice").await;
    wait_for_presence(&mut alice, &["alice"]).await;

    alice
        .send(Message::Text("hello server".into()))
        .await
        .unwrap();

    assert_no_event(&mut alice, Duration::from_millis(300)).await;
    assert!(server.state.registry.is_online(&UserId::from("alice")));
}

#[tokio::test]
async fn client_ping_gets_pong() {
    let server = start_test_server().await;
    let mut alice = connect(&server, "alice").await;
    wait_for_presence(&mut alice, &["alice"]).await;

    alice
        .send(Message::Ping(vec![9, 9].into()))
        .await
        .unwrap();

    let got_pong = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(frame)) = alice.next().await {
            if let Message::Pong(payload) = frame {
                return payload[..] == [9u8, 9];
            }
        }
        false
    })
    .await
    .expect("Timed out waiting for pong");
    assert!(got_pong);
}

#[tokio::test]
async fn server_sends_heartbeat_pings() {
    let heartbeat = HeartbeatConfig {
        ping_interval: Duration::from_millis(200),
        pong_timeout: Duration::from_secs(2),
        write_timeout: Duration::from_secs(2),
    };
    let server = start_test_server_with(heartbeat, 64).await;
    let mut alice = connect(&server, "alice").await;

    let got_ping = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(frame)) = alice.next().await {
            if matches!(frame, Message::Ping(_)) {
                return true;
            }
        }
        false
    })
    .await
    .expect("Timed out waiting for ping");
    assert!(got_ping);

    // Answered pings keep the connection alive across several rounds
    assert_no_event(&mut alice, Duration::from_millis(800)).await;
    assert!(server.state.registry.is_online(&UserId::from("alice")));
}

#[tokio::test]
async fn silent_client_is_dropped_after_pong_timeout() {
    let heartbeat = HeartbeatConfig {
        ping_interval: Duration::from_millis(300),
        pong_timeout: Duration::from_millis(500),
        write_timeout: Duration::from_secs(2),
    };
    let server = start_test_server_with(heartbeat, 64).await;

    // Never polled, so it never answers a ping
    let _silent = connect(&server, "alice").await;
    let mut bob = connect(&server, "bob").await;
    wait_for_presence(&mut bob, &["alice", "bob"]).await;

    wait_for_presence(&mut bob, &["bob"]).await;
    wait_until_offline(&server, "alice").await;
    assert!(server.state.registry.is_online(&UserId::from("bob")));
}

#[tokio::test]
async fn server_shutdown_closes_live_connections() {
    let server = start_test_server().await;
    let mut alice = connect(&server, "alice").await;
    wait_for_presence(&mut alice, &["alice"]).await;

    assert_eq!(server.state.connections.shutdown(), 1);

    let code = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(frame)) = alice.next().await {
            if let Message::Close(Some(close)) = frame {
                return Some(u16::from(close.code));
            }
        }
        None
    })
    .await
    .expect("Timed out waiting for close");
    assert_eq!(code, Some(1001));
    assert!(server.state.registry.online_user_ids().is_empty());
}

#[tokio::test]
async fn stuck_client_is_dropped_when_its_queue_overflows() {
    let heartbeat = HeartbeatConfig {
        write_timeout: Duration::from_millis(500),
        ..HeartbeatConfig::default()
    };
    let server = start_test_server_with(heartbeat, 2).await;
    let client = reqwest::Client::new();

    // Never polled, so its socket buffers fill and its queue backs up
    let _stuck = connect(&server, "alice").await;
    let mut bob = connect(&server, "bob").await;
    wait_for_presence(&mut bob, &["alice", "bob"]).await;

    let alice = UserId::from("alice");
    let text = "x".repeat(4000);
    let mut sent = 0;
    while server.state.registry.is_online(&alice) && sent < 5000 {
        let resp = client
            .post(format!("{}/api/messages/send/alice", server.base_url))
            .bearer_auth(token_for("bob"))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        sent += 1;
    }

    wait_until_offline(&server, "alice").await;
    wait_for_presence(&mut bob, &["bob"]).await;
    assert!(server.state.registry.is_online(&UserId::from("bob")));
}

#[tokio::test]
async fn client_close_gets_no_policy_close_frame() {
    let server = start_test_server().await;
    let mut bob = connect(&server, "bob").await;
    let mut alice = connect(&server, "alice").await;
    wait_for_presence(&mut alice, &["alice", "bob"]).await;

    alice.close(None).await.unwrap();

    let mut close_codes = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(frame)) = alice.next().await {
            if let Message::Close(Some(close)) = frame {
                close_codes.push(u16::from(close.code));
            }
        }
    })
    .await;
    assert!(!close_codes.contains(&1008), "got close codes {:?}", close_codes);

    wait_for_presence(&mut bob, &["bob"]).await;
}
