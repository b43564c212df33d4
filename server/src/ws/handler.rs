use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;

use crate::auth::middleware::credential_from_headers;
use crate::auth::AuthError;
use crate::presence::UserId;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
/// The token may also come from the `jwt` cookie or a bearer header.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket close codes for rejected handshakes:
/// 4001 = token expired
/// 4002 = token invalid or missing
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. The caller is resolved to a user before the
/// connection is admitted; on failure the socket is upgraded and immediately
/// closed with a code the client can act on, and nothing is registered.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let credential = params
        .token
        .or_else(|| credential_from_headers(&headers))
        .unwrap_or_default();

    match state.connections.authenticate(&credential) {
        Ok(user_id) => {
            tracing::info!(user_id = %user_id, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| handle_authenticated(socket, state, user_id))
        }
        Err(err) => {
            let (close_code, reason) = match err {
                AuthError::Expired => (CLOSE_TOKEN_EXPIRED, "Token expired"),
                AuthError::Missing | AuthError::Invalid => (CLOSE_TOKEN_INVALID, "Token invalid"),
            };

            tracing::warn!(close_code = close_code, reason = reason, "WebSocket auth failed");

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

/// Admit the authenticated connection and hand it to its actor.
async fn handle_authenticated(socket: WebSocket, state: AppState, user_id: UserId) {
    let admission = state.connections.admit(user_id);
    actor::run_connection(
        socket,
        Arc::clone(&state.connections),
        admission,
        state.heartbeat,
    )
    .await;
}
