//! Direct messages: storage, live fanout, and the HTTP send/history surface.

pub mod fanout;
pub mod messages;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::presence::UserId;

pub use fanout::MessageFanout;
pub use store::{MessageStore, SqliteMessageStore, StoreError};

/// A persisted direct message. Immutable once the store has assigned its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "senderUserID")]
    pub sender_user_id: UserId,
    #[serde(rename = "receiverUserID")]
    pub receiver_user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "imageRef", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A message built by the sender's request, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_user_id: UserId,
    pub receiver_user_id: UserId,
    pub text: Option<String>,
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}
