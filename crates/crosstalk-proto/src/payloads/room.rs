//! Room membership payload bodies.

use serde::{Deserialize, Serialize};

/// Request to join (or move to) a named room.
///
/// Joining is implicit creation: naming a room that does not exist brings it
/// into being. A client already in another room is moved atomically, leaving
/// the old room first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    /// Room to join. Any UTF-8 string names a room.
    pub room_id: String,
    /// Identifier announced to peers in arrival and departure notifications.
    pub peer_id: String,
}

/// Server notification that a peer entered the recipient's room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerJoined {
    /// Identifier the arriving peer supplied when joining.
    pub peer_id: String,
}

/// Server notification that a peer left the recipient's room.
///
/// Sent exactly once per departure, whether the peer left explicitly, moved
/// to another room, or its transport dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerLeft {
    /// Identifier the departing peer supplied when joining.
    pub peer_id: String,
}

/// Server reply to a room code mint request.
///
/// Minting reserves nothing: the room exists only once someone joins it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    /// Freshly minted room code.
    pub room_id: String,
}
