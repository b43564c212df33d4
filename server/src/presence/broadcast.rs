//! Pushes the current online set to every live connection.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{PresenceRegistry, PushReport};
use crate::ws::protocol::ServerEvent;

/// Announces presence changes. Cheap to clone; all clones share the registry.
#[derive(Debug, Clone)]
pub struct PresenceBroadcaster {
    registry: Arc<PresenceRegistry>,
}

impl PresenceBroadcaster {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry }
    }

    /// Compute the online set and push it to every registered connection,
    /// including the one whose admission or close triggered the call.
    ///
    /// The set is computed and queued under one registry read view, so no
    /// connection can receive a set older than the mutation that preceded
    /// this call.
    pub fn announce(&self) -> PushReport {
        let snapshot = self.registry.snapshot();
        let online = snapshot.online_user_ids();
        let online_count = online.len();

        let frame = match ServerEvent::presence(online).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to serialize presence update");
                return PushReport::default();
            }
        };

        let mut report = PushReport::default();
        for conn in snapshot.all_connections() {
            report.attempted += 1;
            match conn.push(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        conn_id = %conn.id(),
                        user_id = %conn.user_id(),
                        error = %e,
                        "presence push failed, closing connection"
                    );
                }
            }
        }

        debug!(
            online = online_count,
            recipients = report.attempted,
            failed = report.failed(),
            "presence announced"
        );
        report
    }
}
