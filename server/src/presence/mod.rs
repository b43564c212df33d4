//! Presence tracking: who is online, and announcing it.
//!
//! The registry is the only shared mutable state in the live path. It is
//! created once at startup, handed to the lifecycle manager, the broadcaster
//! and the fanout dispatcher, and dropped at shutdown.

pub mod broadcast;
pub mod handlers;
pub mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use broadcast::PresenceBroadcaster;
pub use registry::PresenceRegistry;

/// Stable identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of one live WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Fresh, time-ordered connection id.
    pub fn generate() -> Self {
        Self(format!("conn_{}", uuid::Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outcome of pushing one payload to a set of connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Connections a push was attempted on.
    pub attempted: usize,
    /// Connections whose outbound queue accepted the payload.
    pub delivered: usize,
}

impl PushReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}
