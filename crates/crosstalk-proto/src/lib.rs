//! Wire protocol for the Crosstalk relay.
//!
//! Every message on the wire is a [`Frame`]: a fixed 16-byte [`FrameHeader`]
//! followed by an opcode-specific body. Headers are parsed zero-copy with
//! validated magic, version, and payload bounds; bodies are CBOR and decode
//! into the typed [`Payload`] enum keyed by the header's [`Opcode`].
//!
//! This crate is pure data: no I/O, no async, no state. Both the server and
//! any client share these definitions.

pub mod errors;
pub mod frame;
pub mod header;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::{ErrorPayload, Payload};

/// ALPN identifier negotiated during the QUIC handshake.
pub const ALPN_PROTOCOL: &[u8] = b"crosstalk/1";

/// Frame opcodes.
///
/// The `0x00xx` range is session control, `0x001x` is room membership,
/// `0x002x` is application relay. `Error` sits at the top of the range so
/// new opcodes slot in below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Liveness probe, server to client. Empty body.
    Ping = 0x0001,
    /// Liveness reply, client to server. Empty body.
    Pong = 0x0002,
    /// Client asks to join (or move to) a named room.
    JoinRoom = 0x0010,
    /// Client leaves its room and ends the session. Empty body.
    LeaveRoom = 0x0011,
    /// Client asks for a freshly minted room code. Empty body.
    CreateRoom = 0x0012,
    /// Server reply carrying the minted room code.
    RoomCreated = 0x0013,
    /// Server notification that a peer entered the sender's room.
    PeerJoined = 0x0014,
    /// Server notification that a peer left the sender's room.
    PeerLeft = 0x0015,
    /// Client submits a chat message to its room.
    SendMessage = 0x0020,
    /// Server delivers a chat message to a room member.
    CreateMessage = 0x0021,
    /// Drawing stroke, both submission and delivery.
    CanvasData = 0x0022,
    /// Server error report.
    Error = 0x00FF,
}

impl Opcode {
    /// Parses a wire opcode. Returns `None` for values this version does not
    /// know, which callers treat as a protocol violation.
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Ping),
            0x0002 => Some(Self::Pong),
            0x0010 => Some(Self::JoinRoom),
            0x0011 => Some(Self::LeaveRoom),
            0x0012 => Some(Self::CreateRoom),
            0x0013 => Some(Self::RoomCreated),
            0x0014 => Some(Self::PeerJoined),
            0x0015 => Some(Self::PeerLeft),
            0x0020 => Some(Self::SendMessage),
            0x0021 => Some(Self::CreateMessage),
            0x0022 => Some(Self::CanvasData),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }

    /// Wire representation of this opcode.
    pub const fn to_u16(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        let all = [
            Opcode::Ping,
            Opcode::Pong,
            Opcode::JoinRoom,
            Opcode::LeaveRoom,
            Opcode::CreateRoom,
            Opcode::RoomCreated,
            Opcode::PeerJoined,
            Opcode::PeerLeft,
            Opcode::SendMessage,
            Opcode::CreateMessage,
            Opcode::CanvasData,
            Opcode::Error,
        ];
        for opcode in all {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_opcodes_rejected() {
        assert_eq!(Opcode::from_u16(0x0000), None);
        assert_eq!(Opcode::from_u16(0x0003), None);
        assert_eq!(Opcode::from_u16(0x0030), None);
        assert_eq!(Opcode::from_u16(0xFFFF), None);
    }
}
