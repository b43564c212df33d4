//! REST endpoints for sending and retrieving direct messages.
//!
//! Sending is persist-then-deliver: the sender's request succeeds once the
//! store has the message, whether or not the receiver is online.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use super::{Message, NewMessage};
use crate::auth::AuthUser;
use crate::error::ChatError;
use crate::presence::UserId;
use crate::state::AppState;

/// Maximum message text length (chars).
pub const MAX_TEXT_LENGTH: usize = 4000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
    /// Reference to an image the client already uploaded.
    #[serde(default, alias = "image")]
    pub image_ref: Option<String>,
}

/// Trim and validate the request body into message content.
fn validate(body: SendMessageRequest) -> Result<(Option<String>, Option<String>), ChatError> {
    let text = body
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let image_ref = body
        .image_ref
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty());

    if text.is_none() && image_ref.is_none() {
        return Err(ChatError::InvalidMessage(
            "message needs text or an image".to_string(),
        ));
    }
    if text
        .as_ref()
        .is_some_and(|t| t.chars().count() > MAX_TEXT_LENGTH)
    {
        return Err(ChatError::MessageTooLarge(MAX_TEXT_LENGTH));
    }
    Ok((text, image_ref))
}

/// POST /api/messages/send/{receiver_id}
/// Persist a message from the caller, then push it to the receiver's live
/// connections. Fanout failures never fail the request.
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(sender): AuthUser,
    Path(receiver_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ChatError> {
    let receiver = UserId(receiver_id);
    let (text, image_ref) = validate(body)?;

    let new_message = NewMessage {
        sender_user_id: sender,
        receiver_user_id: receiver,
        text,
        image_ref,
        created_at: Utc::now(),
    };

    let store = state.store.clone();
    let message = tokio::task::spawn_blocking(move || store.persist(new_message))
        .await
        .map_err(|e| ChatError::Internal(format!("persist task failed: {e}")))??;

    tracing::info!(
        message_id = %message.id,
        sender = %message.sender_user_id,
        receiver = %message.receiver_user_id,
        "message stored"
    );

    let _ = state.fanout.deliver(&message);

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/{user_id}
/// Full conversation between the caller and another user, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(other_id): Path<String>,
) -> Result<Json<Vec<Message>>, ChatError> {
    let other = UserId(other_id);
    let store = state.store.clone();

    let messages = tokio::task::spawn_blocking(move || store.find(&caller, &other))
        .await
        .map_err(|e| ChatError::Internal(format!("history task failed: {e}")))??;

    Ok(Json(messages))
}
