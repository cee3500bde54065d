//! Per-connection session lifecycle.
//!
//! ```text
//!             join-room                leave / timeout / transport drop
//! Connecting ----------> Joined -----------------------------------> Left
//!     |                                                                ^
//!     +----------------------------------------------------------------+
//!                  join timeout / transport drop before joining
//! ```
//!
//! [`Session`] tracks one connection's state, last activity, and heartbeat
//! schedule. It is generic over the instant type so tests can run it on a
//! manual clock. Room membership lives in the room table, not here; the
//! session only knows whether it has joined at all.
//!
//! A session in `Connecting` must join within the join timeout. A `Joined`
//! session is pinged every heartbeat interval and dropped when idle past the
//! idle timeout. `Left` is terminal.

use std::ops::Sub;
use std::time::Duration;

use bytes::Bytes;
use crosstalk_proto::{Frame, FrameHeader, Opcode};

/// How long a connection may sit in `Connecting` before it must have joined.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a joined session may go without any inbound frame.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How often an idle joined session is pinged.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, no room joined yet.
    Connecting,
    /// Member of a room, relaying events.
    Joined,
    /// Terminal. The connection is gone or going.
    Left,
}

/// Timeout and heartbeat settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum time allowed in `Connecting`.
    pub join_timeout: Duration,
    /// Maximum time between inbound frames once joined.
    pub idle_timeout: Duration,
    /// Interval between server pings once joined.
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Side effects a session asks its driver to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Send a frame to this session's connection.
    SendFrame(Frame),
    /// Close this session's connection.
    Close {
        /// Human-readable close reason, also logged.
        reason: String,
    },
}

/// State machine for one connection's lifecycle.
#[derive(Debug, Clone)]
pub struct Session<I = std::time::Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: SessionState,
    config: SessionConfig,
    last_activity: I,
    last_ping: Option<I>,
}

impl<I> Session<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Creates a session in `Connecting` with `now` as its first activity.
    pub fn new(now: I, config: SessionConfig) -> Self {
        Self { state: SessionState::Connecting, config, last_activity: now, last_ping: None }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Marks the session as having joined a room.
    ///
    /// Idempotent; rejoining or moving rooms keeps the session `Joined`.
    /// Has no effect on a `Left` session.
    pub fn on_join(&mut self, now: I) {
        if self.state == SessionState::Left {
            return;
        }
        self.state = SessionState::Joined;
        self.last_activity = now;
    }

    /// Transitions to the terminal `Left` state.
    pub fn close(&mut self) {
        self.state = SessionState::Left;
    }

    /// Records inbound traffic, deferring timeouts and heartbeats.
    pub fn update_activity(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Handles a liveness frame.
    ///
    /// A client `Ping` gets a `Pong` reply echoing the request id; a `Pong`
    /// just counts as activity, which `update_activity` has already recorded.
    /// Non-liveness opcodes are ignored here; the driver routes them before
    /// the session sees them.
    pub fn handle_frame(&mut self, frame: &Frame, now: I) -> Vec<SessionAction> {
        self.last_activity = now;
        if self.state == SessionState::Left {
            return Vec::new();
        }
        match frame.header.opcode_enum() {
            Some(Opcode::Ping) => {
                let mut header = FrameHeader::new(Opcode::Pong);
                header.set_request_id(frame.header.request_id());
                vec![SessionAction::SendFrame(Frame::new(header, Bytes::new()))]
            },
            _ => Vec::new(),
        }
    }

    /// Periodic check: closes timed-out sessions, pings idle joined ones.
    pub fn tick(&mut self, now: I) -> Vec<SessionAction> {
        if self.state == SessionState::Left {
            return Vec::new();
        }

        if let Some(elapsed) = self.check_timeout(now) {
            let reason = match self.state {
                SessionState::Connecting => format!("join timeout after {elapsed:?}"),
                _ => format!("idle timeout after {elapsed:?}"),
            };
            self.state = SessionState::Left;
            return vec![SessionAction::Close { reason }];
        }

        let mut actions = Vec::new();
        if self.state == SessionState::Joined && self.heartbeat_due(now) {
            self.last_ping = Some(now);
            let frame = Frame::new(FrameHeader::new(Opcode::Ping), Bytes::new());
            actions.push(SessionAction::SendFrame(frame));
        }
        actions
    }

    /// Elapsed time past the state's timeout limit, if any.
    fn check_timeout(&self, now: I) -> Option<Duration> {
        let limit = match self.state {
            SessionState::Connecting => self.config.join_timeout,
            SessionState::Joined => self.config.idle_timeout,
            SessionState::Left => return None,
        };
        let elapsed = now - self.last_activity;
        (elapsed >= limit).then_some(elapsed)
    }

    fn heartbeat_due(&self, now: I) -> bool {
        let since = match self.last_ping {
            Some(last_ping) => now - last_ping,
            None => now - self.last_activity,
        };
        since >= self.config.heartbeat_interval
    }

    /// Whether the session has reached the terminal state.
    pub fn is_left(&self) -> bool {
        self.state == SessionState::Left
    }
}
