//! Live delivery of persisted messages to the recipient's open connections.

use std::sync::Arc;

use tracing::{debug, warn};

use super::Message;
use crate::presence::{PresenceRegistry, PushReport};
use crate::ws::protocol::ServerEvent;

/// Pushes already-persisted messages to whoever is online to receive them.
#[derive(Debug, Clone)]
pub struct MessageFanout {
    registry: Arc<PresenceRegistry>,
}

impl MessageFanout {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry }
    }

    /// Push `message` once to every connection its receiver has open right
    /// now. An offline receiver gets nothing; the message stays in the store.
    ///
    /// Per-connection failures are logged and counted, never returned: the
    /// message is already durable, so the sender's request has succeeded.
    pub fn deliver(&self, message: &Message) -> PushReport {
        let mut report = PushReport::default();
        let receiver = &message.receiver_user_id;

        let snapshot = self.registry.snapshot();
        let mut recipients = snapshot.connections_of(receiver).peekable();
        if recipients.peek().is_none() {
            debug!(message_id = %message.id, receiver = %receiver, "receiver offline, skipping fanout");
            return report;
        }

        let frame = match ServerEvent::message(message.clone()).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to serialize message event");
                return report;
            }
        };

        for conn in recipients {
            report.attempted += 1;
            match conn.push(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        conn_id = %conn.id(),
                        error = %e,
                        "message push failed, closing connection"
                    );
                }
            }
        }

        debug!(
            message_id = %message.id,
            receiver = %receiver,
            delivered = report.delivered,
            failed = report.failed(),
            "message fanned out"
        );
        report
    }
}
