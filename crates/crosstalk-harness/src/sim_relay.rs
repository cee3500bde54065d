//! In-memory relay wrapper for scenario tests.
//!
//! `SimRelay` drives a [`RelayDriver`] directly. There are no sockets: events
//! go in through method calls, and the frames, closes, and log lines the
//! driver produces are captured for inspection. Tests decide the exact
//! ordering of joins, frames, ticks, and disconnects.

#![allow(clippy::expect_used, reason = "the harness panics loudly on driver misbehavior")]
#![allow(clippy::panic, reason = "the harness panics loudly on driver misbehavior")]

use std::collections::HashMap;
use std::time::Duration;

use crosstalk_core::{LogLevel, RelayConfig, RelayDriver, ServerAction, ServerEvent};
use crosstalk_proto::payloads::app::{ChatMessage, Stroke};
use crosstalk_proto::payloads::room::JoinRoom;
use crosstalk_proto::{Frame, FrameHeader, Opcode, Payload};

use crate::SimEnv;

/// A relay driven entirely in memory.
pub struct SimRelay {
    env: SimEnv,
    driver: RelayDriver<SimEnv>,
    outboxes: HashMap<u64, Vec<Frame>>,
    closed: Vec<(u64, String)>,
    logs: Vec<(LogLevel, String)>,
    next_conn_id: u64,
}

impl SimRelay {
    /// Relay with a default environment and configuration.
    pub fn new() -> Self {
        Self::with_config(SimEnv::new(), RelayConfig::new())
    }

    /// Relay with a seeded environment, for deterministic room codes.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_config(SimEnv::with_seed(seed), RelayConfig::new())
    }

    /// Relay over the given environment and configuration.
    pub fn with_config(env: SimEnv, config: RelayConfig) -> Self {
        let driver = RelayDriver::new(env.clone(), config);
        Self {
            env,
            driver,
            outboxes: HashMap::new(),
            closed: Vec::new(),
            logs: Vec::new(),
            next_conn_id: 1,
        }
    }

    /// The simulated environment, for stepping the clock directly.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Moves the simulated clock forward.
    pub fn advance(&self, duration: Duration) {
        self.env.advance(duration);
    }

    /// Accepts a new connection and returns its id.
    ///
    /// Ids are handed out sequentially starting at 1. A relay at capacity
    /// still consumes the id; the rejection lands in [`Self::drain_closed`].
    pub fn connect(&mut self) -> u64 {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        self.process(ServerEvent::ConnectionAccepted { conn_id });
        conn_id
    }

    /// Delivers a payload from `conn_id` with request id 0.
    pub fn send(&mut self, conn_id: u64, payload: Payload) {
        self.send_with_request(conn_id, 0, payload);
    }

    /// Delivers a payload from `conn_id` with an explicit request id.
    pub fn send_with_request(&mut self, conn_id: u64, request_id: u32, payload: Payload) {
        let mut header = FrameHeader::new(payload.opcode());
        header.set_request_id(request_id);
        let frame = payload.into_frame(header).expect("test payload must encode");
        self.process(ServerEvent::FrameReceived { conn_id, frame });
    }

    /// Joins `conn_id` to a room under the given peer id.
    pub fn join(&mut self, conn_id: u64, room_id: &str, peer_id: &str) {
        self.send(
            conn_id,
            Payload::JoinRoom(JoinRoom {
                room_id: room_id.to_string(),
                peer_id: peer_id.to_string(),
            }),
        );
    }

    /// Sends a chat message from `conn_id`.
    pub fn chat(&mut self, conn_id: u64, text: &str, sender_name: &str) {
        self.send(
            conn_id,
            Payload::SendMessage(ChatMessage {
                text: text.to_string(),
                sender_name: sender_name.to_string(),
            }),
        );
    }

    /// Sends a drawing stroke from `conn_id` claiming membership of `room_id`.
    ///
    /// Coordinates and color are fixed; routing is what these tests exercise.
    pub fn stroke(&mut self, conn_id: u64, room_id: Option<&str>) {
        self.send(
            conn_id,
            Payload::CanvasData(Stroke {
                room_id: room_id.map(str::to_owned),
                x0: 0.0,
                y0: 0.0,
                x1: 1.0,
                y1: 1.0,
                color: "#000000".to_string(),
            }),
        );
    }

    /// Sends an explicit leave from `conn_id`.
    pub fn leave(&mut self, conn_id: u64) {
        self.send(conn_id, Payload::LeaveRoom);
    }

    /// Sends a ping from `conn_id` and returns nothing; the pong lands in the
    /// connection's outbox.
    pub fn ping(&mut self, conn_id: u64, request_id: u32) {
        self.send_with_request(conn_id, request_id, Payload::Ping);
    }

    /// Requests a room code for `conn_id` and returns it.
    ///
    /// The reply frame is consumed; other queued frames stay in the outbox.
    pub fn create_room(&mut self, conn_id: u64) -> String {
        self.send(conn_id, Payload::CreateRoom);

        let outbox = self.outboxes.entry(conn_id).or_default();
        let position = outbox
            .iter()
            .rposition(|frame| frame.header.opcode_enum() == Some(Opcode::RoomCreated))
            .expect("relay must answer a mint request");
        let frame = outbox.remove(position);
        match Payload::from_frame(&frame).expect("room code reply must decode") {
            Payload::RoomCreated(created) => created.room_id,
            other => panic!("expected a room code reply, got {other:?}"),
        }
    }

    /// Reports a transport-level close for `conn_id`.
    pub fn disconnect(&mut self, conn_id: u64, reason: &str) {
        self.process(ServerEvent::ConnectionClosed { conn_id, reason: reason.to_string() });
    }

    /// Runs one timer tick.
    pub fn tick(&mut self) {
        self.process(ServerEvent::Tick);
    }

    /// Takes every frame queued for `conn_id`.
    pub fn take_frames(&mut self, conn_id: u64) -> Vec<Frame> {
        self.outboxes.get_mut(&conn_id).map(std::mem::take).unwrap_or_default()
    }

    /// Takes every frame queued for `conn_id`, decoded.
    pub fn take_payloads(&mut self, conn_id: u64) -> Vec<Payload> {
        self.take_frames(conn_id)
            .iter()
            .map(|frame| Payload::from_frame(frame).expect("driver emitted an undecodable frame"))
            .collect()
    }

    /// Takes the accumulated close instructions.
    pub fn drain_closed(&mut self) -> Vec<(u64, String)> {
        std::mem::take(&mut self.closed)
    }

    /// Takes the accumulated log lines.
    pub fn take_logs(&mut self) -> Vec<(LogLevel, String)> {
        std::mem::take(&mut self.logs)
    }

    /// The underlying driver, for state assertions.
    pub fn driver(&self) -> &RelayDriver<SimEnv> {
        &self.driver
    }

    /// Mutable access to the underlying driver.
    pub fn driver_mut(&mut self) -> &mut RelayDriver<SimEnv> {
        &mut self.driver
    }

    fn process(&mut self, event: ServerEvent) {
        let actions = self.driver.process_event(event);
        for action in actions {
            match action {
                ServerAction::SendFrame { conn_id, frame } => {
                    self.outboxes.entry(conn_id).or_default().push(frame);
                },
                ServerAction::CloseConnection { conn_id, reason } => {
                    self.closed.push((conn_id, reason));
                },
                ServerAction::Log { level, message } => {
                    self.logs.push((level, message));
                },
            }
        }
    }
}

impl Default for SimRelay {
    fn default() -> Self {
        Self::new()
    }
}
