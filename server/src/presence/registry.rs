//! In-memory presence registry: user id -> open connections.
//!
//! A user is a key of the map if and only if at least one of its connections
//! is registered. All mutations go through one write lock, so the check for
//! "was that the last connection" and the removal of the key are atomic.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use super::{ConnectionId, UserId};
use crate::ws::ConnectionHandle;

type ConnectionMap = HashMap<ConnectionId, Arc<ConnectionHandle>>;

/// Live connections per user. A user can hold several at once (tabs, devices).
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    users: RwLock<HashMap<UserId, ConnectionMap>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under its owning user. Re-registering the same
    /// connection id is a no-op.
    pub fn register(&self, handle: Arc<ConnectionHandle>) {
        let mut users = self.users.write();
        let connections = users.entry(handle.user_id().clone()).or_default();
        connections.entry(handle.id().clone()).or_insert(handle);
    }

    /// Remove a connection. Drops the user entry when it was the last one.
    /// Returns `false` if the connection was not registered.
    pub fn unregister(&self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        let mut users = self.users.write();
        let Some(connections) = users.get_mut(user_id) else {
            return false;
        };
        let removed = connections.remove(connection_id).is_some();
        if connections.is_empty() {
            users.remove(user_id);
        }
        removed
    }

    /// Connections currently open for a user; empty when offline.
    pub fn lookup(&self, user_id: &UserId) -> Vec<Arc<ConnectionHandle>> {
        self.snapshot().connections_of(user_id).cloned().collect()
    }

    /// Ids of the connections currently open for a user, sorted.
    pub fn connection_ids(&self, user_id: &UserId) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .snapshot()
            .connections_of(user_id)
            .map(|c| c.id().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Sorted list of users with at least one open connection.
    pub fn online_user_ids(&self) -> Vec<UserId> {
        self.snapshot().online_user_ids()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.users.read().contains_key(user_id)
    }

    /// Total number of registered connections across all users.
    pub fn connection_count(&self) -> usize {
        self.users.read().values().map(HashMap::len).sum()
    }

    /// Consistent read view. Mutations wait until the view is dropped, so
    /// anything computed and pushed through it reflects a single registry
    /// state. Never hold it across an `.await`.
    pub fn snapshot(&self) -> PresenceSnapshot<'_> {
        PresenceSnapshot {
            users: self.users.read(),
        }
    }
}

/// Read-locked view of the registry.
pub struct PresenceSnapshot<'a> {
    users: RwLockReadGuard<'a, HashMap<UserId, ConnectionMap>>,
}

impl PresenceSnapshot<'_> {
    pub fn online_user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.users.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn connections_of<'s>(
        &'s self,
        user_id: &UserId,
    ) -> impl Iterator<Item = &'s Arc<ConnectionHandle>> + 's {
        self.users
            .get(user_id)
            .into_iter()
            .flat_map(|connections| connections.values())
    }

    pub fn all_connections(&self) -> impl Iterator<Item = &Arc<ConnectionHandle>> + '_ {
        self.users.values().flat_map(|connections| connections.values())
    }
}
