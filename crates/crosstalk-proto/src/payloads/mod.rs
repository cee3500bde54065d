//! Typed payload bodies carried by frames.
//!
//! Bodies are CBOR maps keyed by field name; the opcode in the frame header
//! selects which body type to decode, so payloads carry no variant tag of
//! their own. Opcodes with no body (`Ping`, `Pong`, `LeaveRoom`,
//! `CreateRoom`) encode to zero bytes.

pub mod app;
pub mod room;

use serde::{Deserialize, Serialize};

use crate::{Frame, FrameHeader, Opcode, ProtocolError, errors::Result};

/// Typed view of a frame body, one variant per opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Liveness probe.
    Ping,
    /// Liveness reply.
    Pong,
    /// Room join request.
    JoinRoom(room::JoinRoom),
    /// Leave request.
    LeaveRoom,
    /// Room code mint request.
    CreateRoom,
    /// Minted room code reply.
    RoomCreated(room::RoomCreated),
    /// Peer arrival notification.
    PeerJoined(room::PeerJoined),
    /// Peer departure notification.
    PeerLeft(room::PeerLeft),
    /// Chat message submission.
    SendMessage(app::ChatMessage),
    /// Chat message delivery.
    CreateMessage(app::ChatMessage),
    /// Drawing stroke relay.
    CanvasData(app::Stroke),
    /// Error report.
    Error(ErrorPayload),
}

impl Payload {
    /// The opcode this payload travels under.
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::JoinRoom(_) => Opcode::JoinRoom,
            Self::LeaveRoom => Opcode::LeaveRoom,
            Self::CreateRoom => Opcode::CreateRoom,
            Self::RoomCreated(_) => Opcode::RoomCreated,
            Self::PeerJoined(_) => Opcode::PeerJoined,
            Self::PeerLeft(_) => Opcode::PeerLeft,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::CreateMessage(_) => Opcode::CreateMessage,
            Self::CanvasData(_) => Opcode::CanvasData,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Serializes the payload body to CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = Vec::new();
        match self {
            Self::Ping | Self::Pong | Self::LeaveRoom | Self::CreateRoom => {},
            Self::JoinRoom(inner) => encode_body(inner, &mut writer)?,
            Self::RoomCreated(inner) => encode_body(inner, &mut writer)?,
            Self::PeerJoined(inner) => encode_body(inner, &mut writer)?,
            Self::PeerLeft(inner) => encode_body(inner, &mut writer)?,
            Self::SendMessage(inner) => encode_body(inner, &mut writer)?,
            Self::CreateMessage(inner) => encode_body(inner, &mut writer)?,
            Self::CanvasData(inner) => encode_body(inner, &mut writer)?,
            Self::Error(inner) => encode_body(inner, &mut writer)?,
        }
        Ok(writer)
    }

    /// Deserializes a payload body for `opcode`.
    ///
    /// Bodyless opcodes ignore any bytes present rather than rejecting them,
    /// so adding fields to them later stays backward compatible.
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        match opcode {
            Opcode::Ping => Ok(Self::Ping),
            Opcode::Pong => Ok(Self::Pong),
            Opcode::LeaveRoom => Ok(Self::LeaveRoom),
            Opcode::CreateRoom => Ok(Self::CreateRoom),
            Opcode::JoinRoom => decode_body(bytes).map(Self::JoinRoom),
            Opcode::RoomCreated => decode_body(bytes).map(Self::RoomCreated),
            Opcode::PeerJoined => decode_body(bytes).map(Self::PeerJoined),
            Opcode::PeerLeft => decode_body(bytes).map(Self::PeerLeft),
            Opcode::SendMessage => decode_body(bytes).map(Self::SendMessage),
            Opcode::CreateMessage => decode_body(bytes).map(Self::CreateMessage),
            Opcode::CanvasData => decode_body(bytes).map(Self::CanvasData),
            Opcode::Error => decode_body(bytes).map(Self::Error),
        }
    }

    /// Encodes this payload and wraps it in a frame under `header`.
    ///
    /// The header's opcode is overwritten to match the payload; request id
    /// and other fields pass through untouched.
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let body = self.encode()?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, body))
    }

    /// Decodes the typed payload out of a received frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn encode_body(body: &impl Serialize, writer: &mut Vec<u8>) -> Result<()> {
    ciborium::ser::into_writer(body, writer).map_err(|e| ProtocolError::CborEncode(e.to_string()))
}

fn decode_body<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

/// Error report sent to a client before a rejection or disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Numeric error code, one of the associated constants.
    pub code: u16,
    /// Human-readable description of the rejection.
    pub message: String,
    /// Seconds to wait before reconnecting, when the condition is temporary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorPayload {
    /// Frame body was missing or could not be decoded for its opcode.
    pub const INVALID_PAYLOAD: u16 = 0x0001;
    /// Operation requires room membership the sender does not have.
    pub const NOT_IN_ROOM: u16 = 0x0002;
    /// Frame named a room other than the sender's current room.
    pub const ROOM_MISMATCH: u16 = 0x0003;
    /// Server connection limit reached.
    pub const SERVER_FULL: u16 = 0x0004;

    /// Builds an [`Self::INVALID_PAYLOAD`] report.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: message.into(), retry_after: None }
    }

    /// Builds a [`Self::NOT_IN_ROOM`] report.
    pub fn not_in_room() -> Self {
        Self {
            code: Self::NOT_IN_ROOM,
            message: "not joined to any room".to_string(),
            retry_after: None,
        }
    }

    /// Builds a [`Self::ROOM_MISMATCH`] report for the room the frame named.
    pub fn room_mismatch(claimed: &str) -> Self {
        Self {
            code: Self::ROOM_MISMATCH,
            message: format!("room '{claimed}' does not match the joined room"),
            retry_after: None,
        }
    }

    /// Builds a [`Self::SERVER_FULL`] report with a retry hint.
    pub fn server_full() -> Self {
        Self {
            code: Self::SERVER_FULL,
            message: "server at capacity".to_string(),
            retry_after: Some(5),
        }
    }
}
