//! Room table: named rooms and their members.
//!
//! Rooms are created lazily by the first join and destroyed eagerly when the
//! last member leaves; an empty room is indistinguishable from one that never
//! existed. The table also maintains the reverse index (connection to room),
//! which is what guarantees a connection is in at most one room: joining a
//! second room moves the connection instead of adding a membership.

use std::collections::{HashMap, HashSet};

/// Result of a join, telling the caller which notifications to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection entered the room from no room.
    Joined,
    /// The connection was already a member; nothing changed.
    AlreadyMember,
    /// The connection was moved here from another room.
    Transferred {
        /// Room the connection was removed from.
        previous: String,
    },
}

/// Membership state for every live room.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<String, HashSet<u64>>,
    membership: HashMap<u64, String>,
}

impl RoomTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn_id` to `room_id`, creating the room if needed.
    ///
    /// A connection already in another room is moved: removed from the old
    /// room (destroying it if that left it empty) before entering the new
    /// one. The outcome tells the caller which side announcements to make.
    pub fn join(&mut self, room_id: &str, conn_id: u64) -> JoinOutcome {
        if self.membership.get(&conn_id).is_some_and(|current| current == room_id) {
            return JoinOutcome::AlreadyMember;
        }
        match self.remove_from_current(conn_id) {
            Some(previous) => {
                self.insert(room_id, conn_id);
                JoinOutcome::Transferred { previous }
            },
            None => {
                self.insert(room_id, conn_id);
                JoinOutcome::Joined
            },
        }
    }

    fn insert(&mut self, room_id: &str, conn_id: u64) {
        self.rooms.entry(room_id.to_string()).or_default().insert(conn_id);
        self.membership.insert(conn_id, room_id.to_string());
    }

    /// Removes `conn_id` from whatever room it is in, returning that room.
    ///
    /// Destroys the room if the departure left it empty. Returns `None` when
    /// the connection was not in any room, making repeated removal harmless.
    pub fn remove_from_current(&mut self, conn_id: u64) -> Option<String> {
        let room_id = self.membership.remove(&conn_id)?;
        if let Some(members) = self.rooms.get_mut(&room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                self.rooms.remove(&room_id);
            }
        }
        Some(room_id)
    }

    /// Room the connection is currently in.
    pub fn room_of(&self, conn_id: u64) -> Option<&str> {
        self.membership.get(&conn_id).map(String::as_str)
    }

    /// Whether `conn_id` is a member of `room_id`.
    pub fn is_member(&self, room_id: &str, conn_id: u64) -> bool {
        self.membership.get(&conn_id).is_some_and(|current| current == room_id)
    }

    /// Whether a room currently exists (has at least one member).
    pub fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Snapshot of a room's members, sorted for deterministic fan-out order.
    ///
    /// The returned vector is detached from the table, so callers can mutate
    /// membership while iterating it.
    pub fn members(&self, room_id: &str) -> Vec<u64> {
        let mut members: Vec<u64> =
            self.rooms.get(room_id).into_iter().flat_map(|set| set.iter().copied()).collect();
        members.sort_unstable();
        members
    }

    /// Snapshot of a room's members excluding `conn_id`, sorted.
    pub fn members_except(&self, room_id: &str, conn_id: u64) -> Vec<u64> {
        let mut members: Vec<u64> = self
            .rooms
            .get(room_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
            .filter(|member| *member != conn_id)
            .collect();
        members.sort_unstable();
        members
    }

    /// Number of members in a room; zero if it does not exist.
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, HashSet::len)
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms exist.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
