//! Relay behavior tests.
//!
//! End-to-end scenarios driven through the simulation harness: two clients
//! sharing a room, transfers between rooms, departures, and the protocol
//! rejections a misbehaving client triggers. Events are fed in a fixed order,
//! so races like "transport close after an explicit leave" are exercised
//! deterministically.

use std::time::Duration;

use crosstalk_core::{RelayConfig, RelayDriver, ServerAction, ServerEvent};
use crosstalk_harness::{SimEnv, SimRelay};
use crosstalk_proto::payloads::room::JoinRoom;
use crosstalk_proto::{ErrorPayload, FrameHeader, Opcode, Payload};

/// First error payload in a batch, if any.
fn first_error(payloads: &[Payload]) -> Option<&ErrorPayload> {
    payloads.iter().find_map(|payload| match payload {
        Payload::Error(error) => Some(error),
        _ => None,
    })
}

/// Peer ids carried by `PeerJoined` notifications, in delivery order.
fn peer_joined_ids(payloads: &[Payload]) -> Vec<&str> {
    payloads
        .iter()
        .filter_map(|payload| match payload {
            Payload::PeerJoined(joined) => Some(joined.peer_id.as_str()),
            _ => None,
        })
        .collect()
}

/// Peer ids carried by `PeerLeft` notifications, in delivery order.
fn peer_left_ids(payloads: &[Payload]) -> Vec<&str> {
    payloads
        .iter()
        .filter_map(|payload| match payload {
            Payload::PeerLeft(left) => Some(left.peer_id.as_str()),
            _ => None,
        })
        .collect()
}

/// The canonical two-client session: join, notify, chat, draw, disconnect.
#[test]
fn two_clients_share_a_room() {
    let mut relay = SimRelay::new();
    let a = relay.connect();
    let b = relay.connect();

    // First member joins an empty room: nobody to notify.
    relay.join(a, "abc123", "peer-a");
    assert!(relay.take_payloads(a).is_empty());

    // Second member joins: only the existing member hears about it.
    relay.join(b, "abc123", "peer-b");
    assert_eq!(peer_joined_ids(&relay.take_payloads(a)), vec!["peer-b"]);
    assert!(relay.take_payloads(b).is_empty());

    // Chat fans out to everyone, the sender included.
    relay.chat(a, "hello there", "Alice");
    for conn in [a, b] {
        let payloads = relay.take_payloads(conn);
        match payloads.as_slice() {
            [Payload::CreateMessage(message)] => {
                assert_eq!(message.text, "hello there");
                assert_eq!(message.sender_name, "Alice");
            },
            other => panic!("connection {conn} expected one chat delivery, got {other:?}"),
        }
    }

    // Strokes skip the sender and lose their room id in transit.
    relay.stroke(b, Some("abc123"));
    match relay.take_payloads(a).as_slice() {
        [Payload::CanvasData(stroke)] => assert!(stroke.room_id.is_none()),
        other => panic!("expected one stroke delivery, got {other:?}"),
    }
    assert!(relay.take_payloads(b).is_empty());

    // A transport drop tells the survivor who left.
    relay.disconnect(b, "connection reset");
    assert_eq!(peer_left_ids(&relay.take_payloads(a)), vec!["peer-b"]);
    assert!(!relay.driver().rooms().is_member("abc123", b));
    assert_eq!(relay.driver().connection_count(), 1);
}

fn join_event(conn_id: u64, room: &str, peer: &str) -> ServerEvent {
    let payload =
        Payload::JoinRoom(JoinRoom { room_id: room.to_string(), peer_id: peer.to_string() });
    let frame = payload
        .into_frame(FrameHeader::new(Opcode::JoinRoom))
        .expect("join payload must encode");
    ServerEvent::FrameReceived { conn_id, frame }
}

/// A transfer tells the old room about the departure before the new room
/// hears about the arrival.
#[test]
fn transfer_orders_departure_before_arrival() {
    let env = SimEnv::new();
    let mut driver = RelayDriver::new(env, RelayConfig::new());

    for conn_id in 1..=3 {
        driver.process_event(ServerEvent::ConnectionAccepted { conn_id });
    }
    driver.process_event(join_event(1, "room-one", "peer-a"));
    driver.process_event(join_event(2, "room-one", "peer-b"));
    driver.process_event(join_event(3, "room-two", "peer-c"));

    let actions = driver.process_event(join_event(2, "room-two", "peer-b"));

    let left_at = actions
        .iter()
        .position(|action| {
            matches!(
                action,
                ServerAction::SendFrame { conn_id: 1, frame }
                    if frame.header.opcode_enum() == Some(Opcode::PeerLeft)
            )
        })
        .expect("old room must hear the departure");
    let joined_at = actions
        .iter()
        .position(|action| {
            matches!(
                action,
                ServerAction::SendFrame { conn_id: 3, frame }
                    if frame.header.opcode_enum() == Some(Opcode::PeerJoined)
            )
        })
        .expect("new room must hear the arrival");
    assert!(left_at < joined_at, "departure at {left_at} must precede arrival at {joined_at}");

    assert_eq!(driver.rooms().members("room-one"), vec![1]);
    assert_eq!(driver.rooms().members("room-two"), vec![2, 3]);
}

/// The departure notification names the identity the old room knew, even if
/// the client joins the new room under a different one.
#[test]
fn transfer_announces_departure_under_the_old_peer_id() {
    let mut relay = SimRelay::new();
    let a = relay.connect();
    let b = relay.connect();
    let c = relay.connect();
    relay.join(a, "room-one", "peer-a");
    relay.join(b, "room-one", "old-name");
    relay.join(c, "room-two", "peer-c");
    relay.take_frames(a);

    relay.join(b, "room-two", "new-name");

    assert_eq!(peer_left_ids(&relay.take_payloads(a)), vec!["old-name"]);
    assert_eq!(peer_joined_ids(&relay.take_payloads(c)), vec!["new-name"]);
    assert_eq!(relay.driver().peer_id(b), Some("new-name"));
}

#[test]
fn rejoining_the_same_room_is_idempotent() {
    let mut relay = SimRelay::new();
    let a = relay.connect();
    let b = relay.connect();
    relay.join(a, "abc123", "peer-a");
    relay.join(b, "abc123", "peer-b");
    relay.take_frames(a);

    relay.join(a, "abc123", "peer-a");

    assert!(relay.take_payloads(a).is_empty());
    assert!(relay.take_payloads(b).is_empty());
    assert_eq!(relay.driver().rooms().member_count("abc123"), 2);
}

/// An explicit leave announces the departure; the transport close that
/// follows must not announce it again.
#[test]
fn departure_is_announced_exactly_once() {
    let mut relay = SimRelay::new();
    let a = relay.connect();
    let b = relay.connect();
    relay.join(a, "abc123", "peer-a");
    relay.join(b, "abc123", "peer-b");
    relay.take_frames(b);

    relay.leave(a);
    assert_eq!(peer_left_ids(&relay.take_payloads(b)), vec!["peer-a"]);
    assert_eq!(relay.drain_closed(), vec![(a, "client left room".to_string())]);

    relay.disconnect(a, "stream finished");
    assert!(relay.take_payloads(b).is_empty());
    assert!(relay.drain_closed().is_empty());
}

#[test]
fn chat_before_join_is_rejected_without_close() {
    let mut relay = SimRelay::new();
    let a = relay.connect();

    relay.chat(a, "anyone?", "Alice");

    let payloads = relay.take_payloads(a);
    assert_eq!(first_error(&payloads).map(|e| e.code), Some(ErrorPayload::NOT_IN_ROOM));
    assert!(relay.drain_closed().is_empty());

    // The connection is still usable.
    relay.join(a, "abc123", "peer-a");
    assert_eq!(relay.driver().peer_id(a), Some("peer-a"));
}

#[test]
fn stroke_before_join_is_rejected_without_close() {
    let mut relay = SimRelay::new();
    let a = relay.connect();

    relay.stroke(a, Some("abc123"));

    let payloads = relay.take_payloads(a);
    assert_eq!(first_error(&payloads).map(|e| e.code), Some(ErrorPayload::NOT_IN_ROOM));
    assert!(relay.drain_closed().is_empty());
    assert_eq!(relay.driver().connection_count(), 1);
}

#[test]
fn stroke_without_room_id_is_rejected() {
    let mut relay = SimRelay::new();
    let a = relay.connect();
    let b = relay.connect();
    relay.join(a, "abc123", "peer-a");
    relay.join(b, "abc123", "peer-b");
    relay.take_frames(a);

    relay.stroke(a, None);

    let payloads = relay.take_payloads(a);
    assert_eq!(first_error(&payloads).map(|e| e.code), Some(ErrorPayload::INVALID_PAYLOAD));
    assert!(relay.take_payloads(b).is_empty());
    assert!(relay.drain_closed().is_empty());
}

#[test]
fn stroke_for_a_different_room_is_rejected() {
    let mut relay = SimRelay::new();
    let a = relay.connect();
    let b = relay.connect();
    relay.join(a, "abc123", "peer-a");
    relay.join(b, "abc123", "peer-b");
    relay.take_frames(a);

    relay.stroke(a, Some("somewhere-else"));

    let payloads = relay.take_payloads(a);
    assert_eq!(first_error(&payloads).map(|e| e.code), Some(ErrorPayload::ROOM_MISMATCH));
    assert!(relay.take_payloads(b).is_empty());
    assert!(relay.driver().rooms().is_member("abc123", a));
}

/// Minted codes are 7 lowercase base36 characters and create nothing until
/// someone joins.
#[test]
fn minted_code_is_well_formed_and_joinable() {
    let mut relay = SimRelay::with_seed(99);
    let a = relay.connect();

    let code = relay.create_room(a);
    assert_eq!(code.len(), 7);
    assert!(code.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    assert!(!relay.driver().rooms().contains_room(&code));

    relay.join(a, &code, "peer-a");
    assert!(relay.driver().rooms().contains_room(&code));

    let b = relay.connect();
    relay.join(b, &code, "peer-b");
    assert_eq!(peer_joined_ids(&relay.take_payloads(a)), vec!["peer-b"]);
}

#[test]
fn server_full_sends_retry_hint_and_closes() {
    let config = RelayConfig { max_connections: 2, ..RelayConfig::new() };
    let mut relay = SimRelay::with_config(SimEnv::new(), config);

    relay.connect();
    relay.connect();
    let c = relay.connect();

    let payloads = relay.take_payloads(c);
    let error = first_error(&payloads).expect("third connection must be turned away");
    assert_eq!(error.code, ErrorPayload::SERVER_FULL);
    assert_eq!(error.retry_after, Some(5));

    let closed = relay.drain_closed();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].0, c);
    assert_eq!(relay.driver().connection_count(), 2);
}

#[test]
fn ping_is_answered_before_joining() {
    let mut relay = SimRelay::new();
    let a = relay.connect();

    relay.ping(a, 7);

    let frames = relay.take_frames(a);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header.opcode_enum(), Some(Opcode::Pong));
    assert_eq!(frames[0].header.request_id(), 7);
}

/// A joined member that stops talking gets a ping at the heartbeat interval
/// and is dropped at the idle timeout; a member that pongs stays.
#[test]
fn idle_member_is_pinged_then_dropped() {
    let mut relay = SimRelay::new();
    let a = relay.connect();
    let b = relay.connect();
    relay.join(a, "abc123", "peer-a");
    relay.join(b, "abc123", "peer-b");
    relay.take_frames(a);
    relay.take_frames(b);

    relay.advance(Duration::from_secs(20));
    relay.tick();
    assert!(
        relay.take_frames(a).iter().any(|f| f.header.opcode_enum() == Some(Opcode::Ping)),
        "idle member must be pinged at the heartbeat interval"
    );
    relay.send(b, Payload::Pong);
    relay.take_frames(b);

    relay.advance(Duration::from_secs(40));
    relay.tick();

    let closed = relay.drain_closed();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].0, a);
    assert!(closed[0].1.contains("idle timeout"));
    assert_eq!(peer_left_ids(&relay.take_payloads(b)), vec!["peer-a"]);
    assert!(relay.driver().rooms().is_member("abc123", b));
}

#[test]
fn empty_rooms_are_removed_and_can_be_recreated() {
    let mut relay = SimRelay::new();
    let a = relay.connect();
    relay.join(a, "abc123", "peer-a");
    assert!(relay.driver().rooms().contains_room("abc123"));

    relay.leave(a);
    assert!(!relay.driver().rooms().contains_room("abc123"));

    let b = relay.connect();
    relay.join(b, "abc123", "peer-b");
    assert!(relay.driver().rooms().contains_room("abc123"));
    assert!(relay.take_payloads(b).is_empty(), "a recreated room must carry no history");
}
