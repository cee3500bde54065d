//! Sans-IO relay driver.
//!
//! ```text
//! driver.rs - event processing core
//! ├── ServerEvent  - inputs translated from transport I/O
//! ├── ServerAction - outputs for the runtime to execute
//! └── RelayDriver  - pure state machine over registry, rooms, sessions
//! ```
//!
//! Event flow:
//! 1. The runtime translates transport I/O into [`ServerEvent`]s
//! 2. [`RelayDriver::process_event`] mutates relay state and returns actions
//! 3. The runtime executes actions: frame writes, closes, log lines
//!
//! The driver performs no I/O and never blocks, so every ordering the relay
//! cares about (join racing disconnect, double close, a frame arriving after
//! departure) can be reproduced in a unit test by feeding events in that
//! order.
//!
//! Closes initiated by the driver itself (timeouts, protocol violations,
//! explicit leaves) run the departure sequence immediately rather than
//! waiting for the transport to report the close. When the transport's
//! `ConnectionClosed` arrives later, the registry has already forgotten the
//! connection and the event degrades to a debug log, which is what makes
//! departure notifications exactly-once.

use std::collections::HashMap;
use std::fmt;

use crosstalk_proto::payloads::app::{ChatMessage, Stroke};
use crosstalk_proto::payloads::room::{JoinRoom, PeerJoined, PeerLeft, RoomCreated};
use crosstalk_proto::{ErrorPayload, Frame, Payload};

use crate::env::Environment;
use crate::registry::ConnectionRegistry;
use crate::rooms::{JoinOutcome, RoomTable};
use crate::router::{self, Fanout};
use crate::session::{Session, SessionAction, SessionConfig};

/// Connections accepted before new ones are turned away.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Alphabet for minted room codes: lowercase base36.
const ROOM_CODE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of minted room codes.
const ROOM_CODE_LEN: usize = 7;

/// Relay-wide tunables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Per-session timeout and heartbeat settings.
    pub session: SessionConfig,
    /// Maximum simultaneous connections before new ones are rejected.
    pub max_connections: usize,
}

impl RelayConfig {
    /// Default configuration: default session timings, 10k connections.
    pub fn new() -> Self {
        Self { session: SessionConfig::default(), max_connections: DEFAULT_MAX_CONNECTIONS }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Input events the transport runtime feeds the driver.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A transport connection was accepted.
    ConnectionAccepted {
        /// Runtime-assigned connection id.
        conn_id: u64,
    },
    /// A complete frame arrived from a connection.
    FrameReceived {
        /// Sending connection.
        conn_id: u64,
        /// The decoded frame.
        frame: Frame,
    },
    /// A connection's transport ended, cleanly or not.
    ConnectionClosed {
        /// The closed connection.
        conn_id: u64,
        /// Transport-provided reason, logged only.
        reason: String,
    },
    /// Periodic timer for timeout and heartbeat checks.
    Tick,
}

/// Side effects the runtime must execute after an event is processed.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerAction {
    /// Write a frame to one connection.
    SendFrame {
        /// Target connection.
        conn_id: u64,
        /// Frame to write.
        frame: Frame,
    },
    /// Close a connection.
    CloseConnection {
        /// Target connection.
        conn_id: u64,
        /// Human-readable close reason.
        reason: String,
    },
    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Preformatted message.
        message: String,
    },
}

/// Severity for [`ServerAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Development detail.
    Debug,
    /// Normal lifecycle events.
    Info,
    /// Recoverable misbehavior.
    Warn,
    /// Internal failures.
    Error,
}

/// Pure relay state machine: no sockets, no clock reads outside [`Environment`].
pub struct RelayDriver<E: Environment> {
    env: E,
    config: RelayConfig,
    registry: ConnectionRegistry,
    rooms: RoomTable,
    sessions: HashMap<u64, Session<E::Instant>>,
}

impl<E: Environment> RelayDriver<E> {
    /// Creates a driver with no connections or rooms.
    pub fn new(env: E, config: RelayConfig) -> Self {
        Self {
            env,
            config,
            registry: ConnectionRegistry::new(),
            rooms: RoomTable::new(),
            sessions: HashMap::new(),
        }
    }

    /// Processes one event and returns the actions it produced.
    pub fn process_event(&mut self, event: ServerEvent) -> Vec<ServerAction> {
        match event {
            ServerEvent::ConnectionAccepted { conn_id } => self.handle_connection_accepted(conn_id),
            ServerEvent::FrameReceived { conn_id, frame } => {
                self.handle_frame_received(conn_id, &frame)
            },
            ServerEvent::ConnectionClosed { conn_id, reason } => {
                self.handle_connection_closed(conn_id, &reason)
            },
            ServerEvent::Tick => self.handle_tick(),
        }
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Read access to room membership, for the runtime and tests.
    pub fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    /// Peer id a connection announced, if it has joined.
    pub fn peer_id(&self, conn_id: u64) -> Option<&str> {
        self.registry.peer_id(conn_id)
    }

    fn handle_connection_accepted(&mut self, conn_id: u64) -> Vec<ServerAction> {
        if self.registry.len() >= self.config.max_connections {
            let mut actions = error_response(conn_id, 0, ErrorPayload::server_full());
            actions.push(ServerAction::CloseConnection {
                conn_id,
                reason: "server at capacity".to_string(),
            });
            actions.push(log(
                LogLevel::Warn,
                format!(
                    "connection {conn_id} rejected: at capacity ({})",
                    self.config.max_connections
                ),
            ));
            return actions;
        }

        if !self.registry.register(conn_id) {
            return vec![log(LogLevel::Warn, format!("connection {conn_id} already registered"))];
        }
        self.sessions.insert(conn_id, Session::new(self.env.now(), self.config.session.clone()));

        vec![log(LogLevel::Debug, format!("connection {conn_id} accepted"))]
    }

    fn handle_frame_received(&mut self, conn_id: u64, frame: &Frame) -> Vec<ServerAction> {
        let now = self.env.now();
        let Some(session) = self.sessions.get_mut(&conn_id) else {
            return vec![log(
                LogLevel::Debug,
                format!("dropping frame from unknown connection {conn_id}"),
            )];
        };
        session.update_activity(now);

        let request_id = frame.header.request_id();
        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                let mut actions =
                    vec![log(LogLevel::Warn, format!("connection {conn_id}: bad frame: {e}"))];
                actions.extend(self.close_now(conn_id, "protocol violation"));
                return actions;
            },
        };

        match payload {
            Payload::Ping | Payload::Pong => self.handle_liveness(conn_id, frame),
            Payload::JoinRoom(join) => self.handle_join(conn_id, &join),
            Payload::LeaveRoom => self.close_now(conn_id, "client left room"),
            Payload::CreateRoom => self.handle_create_room(conn_id, request_id),
            Payload::SendMessage(message) => self.handle_chat(conn_id, request_id, &message),
            Payload::CanvasData(stroke) => self.handle_stroke(conn_id, request_id, &stroke),
            Payload::Error(error) => {
                let mut actions = vec![log(
                    LogLevel::Warn,
                    format!("connection {conn_id} reported error {}: {}", error.code, error.message),
                )];
                actions.extend(self.close_now(conn_id, "peer reported error"));
                actions
            },
            Payload::RoomCreated(_)
            | Payload::PeerJoined(_)
            | Payload::PeerLeft(_)
            | Payload::CreateMessage(_) => {
                let mut actions = error_response(
                    conn_id,
                    request_id,
                    ErrorPayload::invalid_payload("server-only opcode"),
                );
                actions.push(log(
                    LogLevel::Warn,
                    format!(
                        "connection {conn_id} sent server-only opcode {:#06x}",
                        frame.header.opcode()
                    ),
                ));
                actions
            },
        }
    }

    fn handle_liveness(&mut self, conn_id: u64, frame: &Frame) -> Vec<ServerAction> {
        let now = self.env.now();
        let session_actions = match self.sessions.get_mut(&conn_id) {
            Some(session) => session.handle_frame(frame, now),
            None => return Vec::new(),
        };

        let mut actions = Vec::new();
        for action in session_actions {
            match action {
                SessionAction::SendFrame(reply) => {
                    actions.push(ServerAction::SendFrame { conn_id, frame: reply });
                },
                SessionAction::Close { reason } => {
                    actions.extend(self.close_now(conn_id, &reason));
                },
            }
        }
        actions
    }

    fn handle_join(&mut self, conn_id: u64, join: &JoinRoom) -> Vec<ServerAction> {
        let now = self.env.now();
        let previous_peer = self.registry.peer_id(conn_id).map(str::to_owned);

        match self.rooms.join(&join.room_id, conn_id) {
            JoinOutcome::AlreadyMember => {
                vec![log(
                    LogLevel::Debug,
                    format!("connection {conn_id} re-joined room '{}'", join.room_id),
                )]
            },
            JoinOutcome::Joined => {
                self.registry.set_peer_id(conn_id, join.peer_id.as_str());
                if let Some(session) = self.sessions.get_mut(&conn_id) {
                    session.on_join(now);
                }

                let mut actions = self.announce(
                    &join.room_id,
                    conn_id,
                    Payload::PeerJoined(PeerJoined { peer_id: join.peer_id.clone() }),
                );
                actions.push(log(
                    LogLevel::Info,
                    format!(
                        "connection {conn_id} joined room '{}' as '{}'",
                        join.room_id, join.peer_id
                    ),
                ));
                actions
            },
            JoinOutcome::Transferred { previous } => {
                // The old room hears the departure before the new room hears
                // the arrival, under the identity used in the old room.
                let mut actions = Vec::new();
                if let Some(peer_id) = previous_peer {
                    actions.extend(self.announce(
                        &previous,
                        conn_id,
                        Payload::PeerLeft(PeerLeft { peer_id }),
                    ));
                }

                self.registry.set_peer_id(conn_id, join.peer_id.as_str());
                if let Some(session) = self.sessions.get_mut(&conn_id) {
                    session.on_join(now);
                }

                actions.extend(self.announce(
                    &join.room_id,
                    conn_id,
                    Payload::PeerJoined(PeerJoined { peer_id: join.peer_id.clone() }),
                ));
                actions.push(log(
                    LogLevel::Info,
                    format!(
                        "connection {conn_id} moved from room '{previous}' to '{}'",
                        join.room_id
                    ),
                ));
                actions
            },
        }
    }

    fn handle_chat(
        &mut self,
        conn_id: u64,
        request_id: u32,
        message: &ChatMessage,
    ) -> Vec<ServerAction> {
        let Some(room_id) = self.rooms.room_of(conn_id).map(str::to_owned) else {
            let mut actions = error_response(conn_id, request_id, ErrorPayload::not_in_room());
            actions.push(log(
                LogLevel::Warn,
                format!("connection {conn_id} sent chat before joining a room"),
            ));
            return actions;
        };

        let mut actions = match router::broadcast(
            &self.rooms,
            &room_id,
            conn_id,
            Fanout::All,
            Payload::CreateMessage(message.clone()),
        ) {
            Ok(actions) => actions,
            Err(e) => {
                return vec![log(LogLevel::Error, format!("failed to encode chat delivery: {e}"))];
            },
        };
        actions.push(log(
            LogLevel::Debug,
            format!("relayed chat from connection {conn_id} to room '{room_id}'"),
        ));
        actions
    }

    fn handle_stroke(
        &mut self,
        conn_id: u64,
        request_id: u32,
        stroke: &Stroke,
    ) -> Vec<ServerAction> {
        let Some(room_id) = self.rooms.room_of(conn_id).map(str::to_owned) else {
            let mut actions = error_response(conn_id, request_id, ErrorPayload::not_in_room());
            actions.push(log(
                LogLevel::Warn,
                format!("connection {conn_id} sent a stroke before joining a room"),
            ));
            return actions;
        };

        let Some(claimed) = stroke.room_id.as_deref() else {
            let mut actions = error_response(
                conn_id,
                request_id,
                ErrorPayload::invalid_payload("stroke missing room id"),
            );
            actions.push(log(
                LogLevel::Warn,
                format!("connection {conn_id} sent a stroke without a room id"),
            ));
            return actions;
        };

        if claimed != room_id {
            let mut actions =
                error_response(conn_id, request_id, ErrorPayload::room_mismatch(claimed));
            actions.push(log(
                LogLevel::Warn,
                format!(
                    "connection {conn_id} stroke named room '{claimed}' but it is in '{room_id}'"
                ),
            ));
            return actions;
        }

        match router::broadcast(
            &self.rooms,
            &room_id,
            conn_id,
            Fanout::Others,
            Payload::CanvasData(stroke.without_room()),
        ) {
            Ok(actions) => actions,
            Err(e) => vec![log(LogLevel::Error, format!("failed to encode stroke relay: {e}"))],
        }
    }

    fn handle_create_room(&mut self, conn_id: u64, request_id: u32) -> Vec<ServerAction> {
        let room_id = self.mint_room_code();

        let mut actions = match router::unicast(
            conn_id,
            request_id,
            Payload::RoomCreated(RoomCreated { room_id: room_id.clone() }),
        ) {
            Ok(action) => vec![action],
            Err(e) => {
                return vec![log(
                    LogLevel::Error,
                    format!("failed to encode room code reply: {e}"),
                )];
            },
        };
        actions.push(log(
            LogLevel::Info,
            format!("minted room code '{room_id}' for connection {conn_id}"),
        ));
        actions
    }

    /// Minting hands out a code; the room itself is created by whoever joins
    /// it first.
    fn mint_room_code(&self) -> String {
        let mut bytes = [0u8; ROOM_CODE_LEN];
        self.env.random_bytes(&mut bytes);
        bytes
            .iter()
            .map(|byte| char::from(ROOM_CODE_ALPHABET[*byte as usize % ROOM_CODE_ALPHABET.len()]))
            .collect()
    }

    fn handle_connection_closed(&mut self, conn_id: u64, reason: &str) -> Vec<ServerAction> {
        let Some(info) = self.registry.unregister(conn_id) else {
            return vec![log(
                LogLevel::Debug,
                format!("duplicate close for connection {conn_id}"),
            )];
        };
        if let Some(mut session) = self.sessions.remove(&conn_id) {
            session.close();
        }

        let mut actions = Vec::new();
        if let Some(room_id) = self.rooms.remove_from_current(conn_id) {
            if let Some(peer_id) = info.peer_id {
                actions.extend(self.announce(
                    &room_id,
                    conn_id,
                    Payload::PeerLeft(PeerLeft { peer_id }),
                ));
            }
            actions.push(log(
                LogLevel::Info,
                format!("connection {conn_id} left room '{room_id}'"),
            ));
        }
        actions.push(log(LogLevel::Info, format!("connection {conn_id} closed: {reason}")));
        actions
    }

    fn handle_tick(&mut self) -> Vec<ServerAction> {
        let now = self.env.now();
        let conn_ids: Vec<u64> = self.sessions.keys().copied().collect();

        let mut actions = Vec::new();
        for conn_id in conn_ids {
            let session_actions = match self.sessions.get_mut(&conn_id) {
                Some(session) => session.tick(now),
                None => continue,
            };
            for action in session_actions {
                match action {
                    SessionAction::SendFrame(frame) => {
                        actions.push(ServerAction::SendFrame { conn_id, frame });
                    },
                    SessionAction::Close { reason } => {
                        actions.extend(self.close_now(conn_id, &reason));
                    },
                }
            }
        }
        actions
    }

    /// Departure sequence plus a close instruction for the runtime.
    fn close_now(&mut self, conn_id: u64, reason: &str) -> Vec<ServerAction> {
        let mut actions = self.handle_connection_closed(conn_id, reason);
        actions.push(ServerAction::CloseConnection { conn_id, reason: reason.to_string() });
        actions
    }

    /// Notifies the other members of `room_id` about `payload`.
    fn announce(&self, room_id: &str, sender: u64, payload: Payload) -> Vec<ServerAction> {
        let opcode = payload.opcode();
        match router::broadcast(&self.rooms, room_id, sender, Fanout::Others, payload) {
            Ok(actions) => actions,
            Err(e) => {
                vec![log(LogLevel::Error, format!("failed to encode {opcode:?} notification: {e}"))]
            },
        }
    }
}

impl<E: Environment> fmt::Debug for RelayDriver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayDriver")
            .field("connections", &self.registry.len())
            .field("rooms", &self.rooms.len())
            .finish_non_exhaustive()
    }
}

fn error_response(conn_id: u64, request_id: u32, error: ErrorPayload) -> Vec<ServerAction> {
    match router::unicast(conn_id, request_id, Payload::Error(error)) {
        Ok(action) => vec![action],
        Err(e) => vec![log(LogLevel::Error, format!("failed to encode error payload: {e}"))],
    }
}

fn log(level: LogLevel, message: String) -> ServerAction {
    ServerAction::Log { level, message }
}
