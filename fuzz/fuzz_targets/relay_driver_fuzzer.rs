//! Fuzz target for RelayDriver event processing
//!
//! Drives the sans-IO relay core through arbitrary event sequences. The
//! driver is infallible by design, so any panic is a bug.
//!
//! # Strategy
//!
//! - Well-formed traffic: joins, chats, strokes, pings from live connections
//! - Frames from connections that were already closed
//! - Raw frames with arbitrary opcodes and bodies
//! - Transport disconnects racing application traffic
//! - Clock jumps large enough to fire join and idle timeouts
//!
//! # Invariants
//!
//! - Every frame the driver emits decodes as a known payload
//! - No frame is sent to a connection after its close was issued
//! - No connection is closed twice
//! - Once every connection is gone, no rooms remain

#![no_main]

use std::collections::HashSet;
use std::time::Duration;

use arbitrary::Arbitrary;
use bytes::Bytes;
use crosstalk_core::{
    RelayConfig, RelayDriver, ServerAction, ServerEvent, SessionConfig,
};
use crosstalk_harness::SimEnv;
use crosstalk_proto::payloads::app::{ChatMessage, Stroke};
use crosstalk_proto::payloads::room::JoinRoom;
use crosstalk_proto::{Frame, FrameHeader, Payload};
use libfuzzer_sys::fuzz_target;

const ROOMS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

#[derive(Debug, Arbitrary)]
struct RelayScenario {
    seed: u64,
    max_connections: u8,
    ops: Vec<RelayOp>,
}

#[derive(Debug, Arbitrary)]
enum RelayOp {
    Connect,
    Join { conn: u8, room: u8, peer: u8 },
    Chat { conn: u8, text: u8 },
    Stroke { conn: u8, room: Option<u8> },
    Leave { conn: u8 },
    Ping { conn: u8 },
    CreateRoom { conn: u8 },
    Disconnect { conn: u8 },
    RawFrame { conn: u8, opcode: u16, body: Vec<u8> },
    AdvanceAndTick { secs: u8 },
}

fuzz_target!(|scenario: RelayScenario| {
    let env = SimEnv::with_seed(scenario.seed);
    let config = RelayConfig {
        session: SessionConfig::default(),
        max_connections: usize::from(scenario.max_connections % 8) + 1,
    };
    let mut driver = RelayDriver::new(env.clone(), config);

    let mut ids: Vec<u64> = Vec::new();
    let mut next_id: u64 = 1;
    let mut closed: HashSet<u64> = HashSet::new();

    for op in scenario.ops {
        let event = match op {
            RelayOp::Connect => {
                let conn_id = next_id;
                next_id += 1;
                ids.push(conn_id);
                ServerEvent::ConnectionAccepted { conn_id }
            },

            RelayOp::Join { conn, room, peer } => {
                let Some(conn_id) = pick(&ids, conn) else { continue };
                let payload = Payload::JoinRoom(JoinRoom {
                    room_id: ROOMS[(room as usize) % ROOMS.len()].to_string(),
                    peer_id: format!("peer-{peer}"),
                });
                ServerEvent::FrameReceived { conn_id, frame: frame_for(payload) }
            },

            RelayOp::Chat { conn, text } => {
                let Some(conn_id) = pick(&ids, conn) else { continue };
                let payload = Payload::SendMessage(ChatMessage {
                    text: "x".repeat(usize::from(text % 64)),
                    sender_name: "fuzz".to_string(),
                });
                ServerEvent::FrameReceived { conn_id, frame: frame_for(payload) }
            },

            RelayOp::Stroke { conn, room } => {
                let Some(conn_id) = pick(&ids, conn) else { continue };
                let payload = Payload::CanvasData(Stroke {
                    room_id: room.map(|r| ROOMS[(r as usize) % ROOMS.len()].to_string()),
                    x0: 0.0,
                    y0: 0.0,
                    x1: 1.0,
                    y1: 1.0,
                    color: "#000000".to_string(),
                });
                ServerEvent::FrameReceived { conn_id, frame: frame_for(payload) }
            },

            RelayOp::Leave { conn } => {
                let Some(conn_id) = pick(&ids, conn) else { continue };
                ServerEvent::FrameReceived { conn_id, frame: frame_for(Payload::LeaveRoom) }
            },

            RelayOp::Ping { conn } => {
                let Some(conn_id) = pick(&ids, conn) else { continue };
                ServerEvent::FrameReceived { conn_id, frame: frame_for(Payload::Ping) }
            },

            RelayOp::CreateRoom { conn } => {
                let Some(conn_id) = pick(&ids, conn) else { continue };
                ServerEvent::FrameReceived { conn_id, frame: frame_for(Payload::CreateRoom) }
            },

            RelayOp::Disconnect { conn } => {
                let Some(conn_id) = pick(&ids, conn) else { continue };
                let actions = driver.process_event(ServerEvent::ConnectionClosed {
                    conn_id,
                    reason: "transport closed".to_string(),
                });
                check_actions(&actions, &mut closed);
                closed.insert(conn_id);
                continue;
            },

            RelayOp::RawFrame { conn, opcode, body } => {
                let Some(conn_id) = pick(&ids, conn) else { continue };
                let mut bytes = [0u8; FrameHeader::SIZE];
                bytes[0..4].copy_from_slice(&FrameHeader::MAGIC.to_be_bytes());
                bytes[4] = FrameHeader::VERSION;
                bytes[6..8].copy_from_slice(&opcode.to_be_bytes());
                let header = *FrameHeader::from_bytes(&bytes).expect("hand-built header is valid");

                let end = body.len().min(1024);
                let frame = Frame::new(header, Bytes::copy_from_slice(&body[..end]));
                ServerEvent::FrameReceived { conn_id, frame }
            },

            RelayOp::AdvanceAndTick { secs } => {
                env.advance(Duration::from_secs(u64::from(secs)));
                ServerEvent::Tick
            },
        };

        let actions = driver.process_event(event);
        check_actions(&actions, &mut closed);
    }

    // Drop whatever is still connected; afterwards no rooms may remain
    for conn_id in ids {
        if !closed.contains(&conn_id) {
            let actions = driver.process_event(ServerEvent::ConnectionClosed {
                conn_id,
                reason: "fuzz teardown".to_string(),
            });
            check_actions(&actions, &mut closed);
        }
    }
    assert!(driver.rooms().is_empty(), "rooms must empty out once every connection is gone");
});

fn pick(ids: &[u64], index: u8) -> Option<u64> {
    if ids.is_empty() { None } else { Some(ids[(index as usize) % ids.len()]) }
}

fn frame_for(payload: Payload) -> Frame {
    let header = FrameHeader::new(payload.opcode());
    payload.into_frame(header).expect("valid payloads must encode")
}

fn check_actions(actions: &[ServerAction], closed: &mut HashSet<u64>) {
    for action in actions {
        match action {
            ServerAction::SendFrame { conn_id, frame } => {
                assert!(!closed.contains(conn_id), "send to connection {conn_id} after its close");
                Payload::from_frame(frame).expect("driver must only emit well-formed frames");
            },
            ServerAction::CloseConnection { conn_id, .. } => {
                assert!(closed.insert(*conn_id), "connection {conn_id} closed twice");
            },
            ServerAction::Log { .. } => {},
        }
    }
}
