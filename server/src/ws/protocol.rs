//! JSON payloads pushed from the server to connected clients.
//!
//! ```text
//! { "type": "presence", "onlineUserIDs": ["..."] }
//! { "type": "message",  "message": { "id", "senderUserID", "receiverUserID", "text"?, "imageRef"?, "createdAt" } }
//! ```

use axum::extract::ws::Message as WsMessage;
use serde::{Deserialize, Serialize};

use crate::dm::Message;
use crate::presence::UserId;

/// Server -> client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    Presence {
        #[serde(rename = "onlineUserIDs")]
        online_user_ids: Vec<UserId>,
    },
    Message {
        message: Message,
    },
}

impl ServerEvent {
    pub fn presence(online_user_ids: Vec<UserId>) -> Self {
        Self::Presence { online_user_ids }
    }

    pub fn message(message: Message) -> Self {
        Self::Message { message }
    }

    /// Serialize into a WebSocket text frame. The frame is reference counted,
    /// so cloning it per recipient does not copy the payload.
    pub fn to_frame(&self) -> Result<WsMessage, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(WsMessage::Text(json.into()))
    }
}
