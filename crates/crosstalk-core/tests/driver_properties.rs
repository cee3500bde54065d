//! Property-based tests for the relay driver.
//!
//! Invariants that must hold for any membership shape and event order, run
//! against the simulation harness with proptest-chosen seeds so failures
//! replay deterministically.

use std::collections::HashMap;

use crosstalk_harness::SimRelay;
use crosstalk_proto::Payload;
use proptest::prelude::*;

/// Connects `count` members and joins them all to `room`.
fn build_room(relay: &mut SimRelay, room: &str, count: usize) -> Vec<u64> {
    let mut conns = Vec::with_capacity(count);
    for i in 0..count {
        let conn = relay.connect();
        relay.join(conn, room, &format!("peer-{i}"));
        conns.push(conn);
    }
    for conn in &conns {
        relay.take_frames(*conn);
    }
    conns
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: chat reaches every member exactly once, the sender included,
    /// and nobody outside the room.
    #[test]
    fn prop_chat_reaches_every_member_once(
        seed in any::<u64>(),
        member_count in 2usize..8,
        sender_index in 0usize..8,
    ) {
        let mut relay = SimRelay::with_seed(seed);
        let conns = build_room(&mut relay, "shared", member_count);
        let outsider = relay.connect();

        let sender = conns[sender_index % member_count];
        relay.chat(sender, "payload", "someone");

        for conn in &conns {
            let deliveries = relay
                .take_payloads(*conn)
                .into_iter()
                .filter(|p| matches!(p, Payload::CreateMessage(_)))
                .count();
            prop_assert_eq!(deliveries, 1);
        }
        prop_assert!(relay.take_payloads(outsider).is_empty());
    }

    /// Property: a stroke reaches everyone except its sender, with the room
    /// id stripped.
    #[test]
    fn prop_stroke_skips_only_the_sender(
        seed in any::<u64>(),
        member_count in 2usize..8,
        sender_index in 0usize..8,
    ) {
        let mut relay = SimRelay::with_seed(seed);
        let conns = build_room(&mut relay, "shared", member_count);

        let sender = conns[sender_index % member_count];
        relay.stroke(sender, Some("shared"));

        for conn in &conns {
            let strokes: Vec<_> = relay
                .take_payloads(*conn)
                .into_iter()
                .filter_map(|p| match p {
                    Payload::CanvasData(stroke) => Some(stroke),
                    _ => None,
                })
                .collect();
            if *conn == sender {
                prop_assert!(strokes.is_empty());
            } else {
                prop_assert_eq!(strokes.len(), 1);
                prop_assert!(strokes[0].room_id.is_none());
            }
        }
    }

    /// Property: however a member goes away, the others hear about it exactly
    /// once, even when the transport reports the close again afterwards.
    #[test]
    fn prop_departure_is_announced_exactly_once(
        seed in any::<u64>(),
        member_count in 2usize..6,
        explicit_leave in any::<bool>(),
    ) {
        let mut relay = SimRelay::with_seed(seed);
        let conns = build_room(&mut relay, "shared", member_count);

        let leaver = conns[0];
        if explicit_leave {
            relay.leave(leaver);
        } else {
            relay.disconnect(leaver, "transport drop");
        }
        relay.disconnect(leaver, "late transport echo");

        for conn in &conns[1..] {
            let departures = relay
                .take_payloads(*conn)
                .iter()
                .filter(|p| matches!(p, Payload::PeerLeft(_)))
                .count();
            prop_assert_eq!(departures, 1);
        }
    }

    /// Property: minted codes are always 7 lowercase base36 characters and
    /// never create the room themselves.
    #[test]
    fn prop_room_codes_are_well_formed(seed in any::<u64>()) {
        let mut relay = SimRelay::with_seed(seed);
        let conn = relay.connect();

        let code = relay.create_room(conn);

        prop_assert_eq!(code.len(), 7);
        prop_assert!(code.chars().all(|c| matches!(c, '0'..='9' | 'a'..='z')));
        prop_assert!(!relay.driver().rooms().contains_room(&code));
    }

    /// Property: after any sequence of joins, each connection sits in the
    /// room it joined last and nowhere else.
    #[test]
    fn prop_last_join_wins(
        seed in any::<u64>(),
        moves in prop::collection::vec((0usize..5, 0usize..4), 1..30),
    ) {
        let mut relay = SimRelay::with_seed(seed);
        let conns: Vec<u64> = (0..5).map(|_| relay.connect()).collect();
        let rooms = ["east", "west", "north", "south"];

        let mut expected: HashMap<u64, &str> = HashMap::new();
        for (conn_index, room_index) in moves {
            let conn = conns[conn_index];
            let room = rooms[room_index];
            relay.join(conn, room, &format!("peer-{conn_index}"));
            expected.insert(conn, room);
        }

        for conn in &conns {
            prop_assert_eq!(relay.driver().rooms().room_of(*conn), expected.get(conn).copied());
        }
        let total: usize =
            rooms.iter().map(|room| relay.driver().rooms().member_count(room)).sum();
        prop_assert_eq!(total, expected.len());
    }

    /// Property: disconnecting every member empties the relay, and repeated
    /// disconnects change nothing.
    #[test]
    fn prop_disconnect_always_cleans_up(
        seed in any::<u64>(),
        member_count in 1usize..6,
    ) {
        let mut relay = SimRelay::with_seed(seed);
        let conns = build_room(&mut relay, "shared", member_count);

        for conn in &conns {
            relay.disconnect(*conn, "gone");
        }
        prop_assert_eq!(relay.driver().connection_count(), 0);
        prop_assert!(!relay.driver().rooms().contains_room("shared"));

        for conn in &conns {
            relay.disconnect(*conn, "gone again");
        }
        prop_assert_eq!(relay.driver().connection_count(), 0);
        prop_assert!(relay.driver().rooms().is_empty());
    }
}
