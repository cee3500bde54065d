//! Fuzz target for Payload::from_frame
//!
//! This fuzzer tests payload deserialization (CBOR decoding) with:
//! - Malformed CBOR data
//! - Type confusion attacks (wrong payload type for opcode)
//! - Oversized strings or collections
//! - Nested structures exceeding depth limits
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use bytes::Bytes;
use crosstalk_proto::{Frame, FrameHeader, Opcode, Payload};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Cap the body at the protocol maximum; oversized frames are rejected
    // before payload decoding ever runs
    let body = &data[..data.len().min(FrameHeader::MAX_PAYLOAD_SIZE as usize)];

    // Try every opcode so each payload type sees the same bytes
    let opcodes = [
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

    for opcode in opcodes {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::copy_from_slice(body));

        // Attempt to deserialize the payload
        // This should never panic, only return Err for invalid CBOR
        let _ = Payload::from_frame(&frame);
    }
});
