//! Connection lifecycle: `Pending -> Admitted -> Closed`.
//!
//! Admission registers the connection and announces presence; closing
//! unregisters it and announces again. Each state change and its registry
//! mutation happen under the session's own lock, so a close that races an
//! admission can neither leave a dangling registry entry nor run twice.

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{outbound_channel, ConnectionHandle, ConnectionReceiver};
use crate::auth::{AuthError, IdentityResolver};
use crate::presence::{ConnectionId, PresenceBroadcaster, PresenceRegistry, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Admitted,
    Closed,
}

/// What ended a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    TransportError,
    HeartbeatTimeout,
    /// Push failure or explicit server-side close.
    Forced,
    ServerShutdown,
}

impl CloseReason {
    /// Close frame the server sends for this cause, if any. A client that
    /// closed or vanished gets nothing.
    pub fn close_frame(self) -> Option<Message> {
        let (code, reason) = match self {
            CloseReason::ClientClosed | CloseReason::TransportError => return None,
            CloseReason::HeartbeatTimeout => (1001, "Pong timeout"),
            CloseReason::ServerShutdown => (1001, "Server shutting down"),
            CloseReason::Forced => (1008, "Connection closed by server"),
        };
        Some(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::TransportError => "transport_error",
            CloseReason::HeartbeatTimeout => "heartbeat_timeout",
            CloseReason::Forced => "forced",
            CloseReason::ServerShutdown => "server_shutdown",
        };
        f.write_str(s)
    }
}

/// One connection's lifecycle record.
#[derive(Debug)]
pub struct Session {
    handle: Arc<ConnectionHandle>,
    state: Mutex<ConnectionState>,
}

impl Session {
    fn new(handle: Arc<ConnectionHandle>) -> Self {
        Self {
            handle,
            state: Mutex::new(ConnectionState::Pending),
        }
    }

    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    pub fn id(&self) -> &ConnectionId {
        self.handle.id()
    }

    pub fn user_id(&self) -> &UserId {
        self.handle.user_id()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}

/// A new session plus the receiving end of its outbound queue, which the
/// connection actor drains into the socket.
#[derive(Debug)]
pub struct Admission {
    pub session: Arc<Session>,
    pub outbound: ConnectionReceiver,
}

/// Owns every live connection for its whole lifetime.
pub struct ConnectionManager {
    registry: Arc<PresenceRegistry>,
    broadcaster: PresenceBroadcaster,
    resolver: Arc<dyn IdentityResolver>,
    sessions: DashMap<ConnectionId, Arc<Session>>,
    queue_capacity: usize,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        resolver: Arc<dyn IdentityResolver>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            broadcaster: PresenceBroadcaster::new(Arc::clone(&registry)),
            registry,
            resolver,
            sessions: DashMap::new(),
            queue_capacity,
        }
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    /// Resolve a credential to a user. Failure has no side effects.
    pub fn authenticate(&self, credential: &str) -> Result<UserId, AuthError> {
        self.resolver.resolve(credential)
    }

    /// Authenticate and admit in one step.
    pub fn on_connection_opened(&self, credential: &str) -> Result<Admission, AuthError> {
        let user_id = self.authenticate(credential)?;
        Ok(self.admit(user_id))
    }

    /// Create a session for an authenticated user and admit it.
    pub fn admit(&self, user_id: UserId) -> Admission {
        let admission = self.prepare(user_id);
        let _ = self.activate(&admission.session);
        admission
    }

    /// Create a `Pending` session. It is tracked but not yet online.
    pub fn prepare(&self, user_id: UserId) -> Admission {
        let (tx, rx) = outbound_channel(self.queue_capacity);
        let handle = Arc::new(ConnectionHandle::new(ConnectionId::generate(), user_id, tx));
        let session = Arc::new(Session::new(handle));
        self.sessions
            .insert(session.id().clone(), Arc::clone(&session));
        Admission {
            session,
            outbound: rx,
        }
    }

    /// `Pending -> Admitted`: register, then announce. Returns `false` if the
    /// session was not pending (already admitted or closed).
    pub fn activate(&self, session: &Session) -> bool {
        {
            let mut state = session.state.lock();
            if *state != ConnectionState::Pending {
                return false;
            }
            self.registry.register(Arc::clone(session.handle()));
            *state = ConnectionState::Admitted;
        }

        info!(
            user_id = %session.user_id(),
            conn_id = %session.id(),
            "connection admitted"
        );
        let _ = self.broadcaster.announce();
        true
    }

    /// Close a connection by id. Only the first call for a connection does
    /// anything; repeated or concurrent closes return `false`.
    pub fn close(&self, connection_id: &ConnectionId, reason: CloseReason) -> bool {
        let session = self
            .sessions
            .get(connection_id)
            .map(|entry| Arc::clone(entry.value()));
        match session {
            Some(session) => self.close_session(&session, reason),
            None => {
                debug!(conn_id = %connection_id, %reason, "close for unknown or closed connection ignored");
                false
            }
        }
    }

    fn close_session(&self, session: &Session, reason: CloseReason) -> bool {
        let was_admitted = {
            let mut state = session.state.lock();
            match *state {
                ConnectionState::Closed => return false,
                ConnectionState::Admitted => {
                    let _ = self.registry.unregister(session.user_id(), session.id());
                    *state = ConnectionState::Closed;
                    true
                }
                ConnectionState::Pending => {
                    *state = ConnectionState::Closed;
                    false
                }
            }
        };

        // Queued behind anything already pending, so the client sees it last.
        if let Some(frame) = reason.close_frame() {
            let _ = session.handle().push(frame);
        }
        session.handle().force_close();
        self.sessions.remove(session.id());

        info!(
            user_id = %session.user_id(),
            conn_id = %session.id(),
            %reason,
            "connection closed"
        );
        if was_admitted {
            let _ = self.broadcaster.announce();
        }
        true
    }

    /// Close every live session. Called once at process shutdown.
    pub fn shutdown(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut closed = 0;
        for session in &sessions {
            if self.close_session(session, CloseReason::ServerShutdown) {
                closed += 1;
            }
        }
        closed
    }

    /// Number of sessions not yet closed.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
