//! Fan-out primitives: who receives which frame.
//!
//! Routing resolves recipients at call time from a detached membership
//! snapshot, so later joins or leaves cannot change who a broadcast reaches.
//! The payload is encoded once; recipients share the same frame body.

use crosstalk_proto::{FrameHeader, Payload, Result};

use crate::driver::ServerAction;
use crate::rooms::RoomTable;

/// Which room members receive a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fanout {
    /// Every member, the sender included. Used for chat delivery.
    All,
    /// Every member except the sender. Used for notifications and strokes.
    Others,
}

/// Builds send actions delivering `payload` to members of `room_id`.
///
/// Recipients are snapshotted before the frame is built; an empty recipient
/// set produces no actions and skips encoding entirely.
pub fn broadcast(
    rooms: &RoomTable,
    room_id: &str,
    sender: u64,
    fanout: Fanout,
    payload: Payload,
) -> Result<Vec<ServerAction>> {
    let recipients = match fanout {
        Fanout::All => rooms.members(room_id),
        Fanout::Others => rooms.members_except(room_id, sender),
    };
    if recipients.is_empty() {
        return Ok(Vec::new());
    }

    let opcode = payload.opcode();
    let frame = payload.into_frame(FrameHeader::new(opcode))?;
    Ok(recipients
        .into_iter()
        .map(|conn_id| ServerAction::SendFrame { conn_id, frame: frame.clone() })
        .collect())
}

/// Builds a send action delivering `payload` to one connection, echoing the
/// request id of the frame being answered.
pub fn unicast(conn_id: u64, request_id: u32, payload: Payload) -> Result<ServerAction> {
    let mut header = FrameHeader::new(payload.opcode());
    header.set_request_id(request_id);
    let frame = payload.into_frame(header)?;
    Ok(ServerAction::SendFrame { conn_id, frame })
}
