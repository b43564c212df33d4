use std::sync::Arc;
use std::time::Duration;

use crate::auth::IdentityResolver;
use crate::config::Config;
use crate::dm::{MessageFanout, MessageStore};
use crate::presence::PresenceRegistry;
use crate::ws::lifecycle::ConnectionManager;

/// Liveness and backpressure settings for each connection actor.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// How often the server pings the client.
    pub ping_interval: Duration,
    /// How long to wait for the matching pong before closing.
    pub pong_timeout: Duration,
    /// Upper bound on writing a single frame to the socket.
    pub write_timeout: Duration,
}

impl HeartbeatConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ping_interval: Duration::from_secs(config.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs.max(1)),
            write_timeout: Duration::from_secs(config.write_timeout_secs.max(1)),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Durable message store
    pub store: Arc<dyn MessageStore>,
    /// Credential -> user id
    pub resolver: Arc<dyn IdentityResolver>,
    /// Who is online, and on which connections
    pub registry: Arc<PresenceRegistry>,
    /// Admission and close of live connections
    pub connections: Arc<ConnectionManager>,
    /// Live delivery of persisted messages
    pub fanout: MessageFanout,
    pub heartbeat: HeartbeatConfig,
}

impl AppState {
    /// Wire the live-path components around one shared presence registry.
    pub fn new(
        store: Arc<dyn MessageStore>,
        resolver: Arc<dyn IdentityResolver>,
        queue_capacity: usize,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let connections = Arc::new(ConnectionManager::new(
            Arc::clone(&registry),
            Arc::clone(&resolver),
            queue_capacity,
        ));
        Self {
            store,
            resolver,
            fanout: MessageFanout::new(Arc::clone(&registry)),
            registry,
            connections,
            heartbeat,
        }
    }
}
