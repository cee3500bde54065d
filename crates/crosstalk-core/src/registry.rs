//! Connection registry: which transport connections exist and who they are.
//!
//! The registry is the single source of truth for connection liveness. A
//! connection appears here the moment the transport hands it over and leaves
//! exactly once, which is what makes departure notifications exactly-once:
//! whichever path observes the removal first wins, every later path sees an
//! absent entry and does nothing.

use std::collections::HashMap;

/// Per-connection identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Peer identifier announced on join. `None` until the first join.
    pub peer_id: Option<String>,
}

impl ConnectionInfo {
    /// Creates an empty identity for a connection that has not joined yet.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Tracks every live connection and its identity.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<u64, ConnectionInfo>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. Returns `false` if the id is already present.
    pub fn register(&mut self, conn_id: u64) -> bool {
        if self.connections.contains_key(&conn_id) {
            return false;
        }
        self.connections.insert(conn_id, ConnectionInfo::new());
        true
    }

    /// Removes a connection, returning its identity.
    ///
    /// Returns `None` if the connection was never registered or already
    /// removed, so callers can use the return value as an exactly-once gate.
    pub fn unregister(&mut self, conn_id: u64) -> Option<ConnectionInfo> {
        self.connections.remove(&conn_id)
    }

    /// Records the peer id a connection announced when joining.
    ///
    /// Returns `false` if the connection is not registered.
    pub fn set_peer_id(&mut self, conn_id: u64, peer_id: impl Into<String>) -> bool {
        match self.connections.get_mut(&conn_id) {
            Some(info) => {
                info.peer_id = Some(peer_id.into());
                true
            },
            None => false,
        }
    }

    /// Peer id announced by a connection, if it has joined a room.
    pub fn peer_id(&self, conn_id: u64) -> Option<&str> {
        self.connections.get(&conn_id)?.peer_id.as_deref()
    }

    /// Whether a connection is currently registered.
    pub fn contains(&self, conn_id: u64) -> bool {
        self.connections.contains_key(&conn_id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
