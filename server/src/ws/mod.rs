pub mod actor;
pub mod handler;
pub mod lifecycle;
pub mod protocol;

use axum::extract::ws::Message;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::presence::{ConnectionId, UserId};

/// Sender half of a connection's outbound queue.
/// The actor's writer task owns the receiver and drains it into the socket.
pub type ConnectionSender = mpsc::Sender<Message>;

/// Receiver half of a connection's outbound queue.
pub type ConnectionReceiver = mpsc::Receiver<Message>;

/// Create the bounded outbound queue for a new connection.
pub fn outbound_channel(capacity: usize) -> (ConnectionSender, ConnectionReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Why a push to a single connection did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connection is closed")]
    Closed,
}

/// Handle to one live connection, shared between the registry and its actor.
///
/// Pushing never waits: the payload is either queued immediately or the push
/// fails. A failed push marks the connection for forced close, since a peer
/// whose queue is full is not keeping up and a closed queue means the writer
/// is gone.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    tx: ConnectionSender,
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, user_id: UserId, tx: ConnectionSender) -> Self {
        Self {
            id,
            user_id,
            tx,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queue a frame for this connection without blocking.
    pub fn push(&self, msg: Message) -> Result<(), DeliveryError> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.force_close();
                Err(DeliveryError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.force_close();
                Err(DeliveryError::Closed)
            }
        }
    }

    /// Ask the connection's actor to shut down.
    pub fn force_close(&self) {
        self.shutdown.cancel();
    }

    /// Whether a forced close has been requested.
    pub fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when this connection must stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
