//! Room lifecycle integration tests.
//!
//! Drive the signaling actor through `TestClient`s and check membership,
//! readiness, departure and call-end behaviour end to end.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use common::types::RoomId;
use serde_json::json;
use signaling_service::actors::SignalingActorHandle;
use signaling_service::gate::mock::MockGate;
use signaling_service::protocol::{ChatRequest, ClientEvent, ServerEvent};
use signaling_test_utils::TestClient;

const QUIET: Duration = Duration::from_millis(100);

fn relay() -> SignalingActorHandle {
    SignalingActorHandle::new("sg-it".to_string(), None, Duration::from_secs(1))
}

/// Connect two clients and seat them in `room`, consuming the join events.
async fn seated_pair(actor: &SignalingActorHandle, room: &str) -> (TestClient, TestClient) {
    let mut a = TestClient::connect(actor).await;
    let mut b = TestClient::connect(actor).await;

    a.join(room).await;
    a.expect_joined().await;
    a.expect_event(ServerEvent::Waiting).await;

    b.join(room).await;
    b.expect_joined().await;
    b.expect_named("ready").await;
    a.expect_named("peer-joined").await;
    a.expect_named("ready").await;

    (a, b)
}

async fn participant_count(actor: &SignalingActorHandle, room: &str) -> Option<usize> {
    actor
        .get_room(RoomId::new(room))
        .await
        .unwrap()
        .map(|snapshot| snapshot.participants.len())
}

#[tokio::test]
async fn test_sequential_joins_pair_up() {
    let actor = relay();
    let mut a = TestClient::connect(&actor).await;
    let mut b = TestClient::connect(&actor).await;

    a.join("r1").await;
    let (room_id, peers) = a.expect_joined().await;
    assert_eq!(room_id, "r1");
    assert!(peers.is_empty());
    a.expect_event(ServerEvent::Waiting).await;

    b.join("r1").await;
    let (_, peers) = b.expect_joined().await;
    assert_eq!(peers, vec![a.identity().clone()]);
    b.expect_event(ServerEvent::Ready {
        peer_identity: a.identity().clone(),
    })
    .await;

    let ServerEvent::PeerJoined { identity, .. } = a.next_event().await else {
        unreachable!("expected peer-joined");
    };
    assert_eq!(&identity, b.identity());
    a.expect_event(ServerEvent::Ready {
        peer_identity: b.identity().clone(),
    })
    .await;
}

#[tokio::test]
async fn test_third_join_is_room_full() {
    let actor = relay();
    let (_a, _b) = seated_pair(&actor, "r1").await;

    let mut c = TestClient::connect(&actor).await;
    c.join("r1").await;
    c.expect_event(ServerEvent::RoomFull).await;

    assert_eq!(participant_count(&actor, "r1").await, Some(2));
}

#[tokio::test]
async fn test_denied_join_leaves_room_untouched() {
    let actor = SignalingActorHandle::new(
        "sg-it".to_string(),
        Some(Arc::new(MockGate::denying())),
        Duration::from_secs(1),
    );
    let mut a = TestClient::connect(&actor).await;

    a.join("r1").await;
    a.expect_event(ServerEvent::JoinDenied).await;

    assert_eq!(participant_count(&actor, "r1").await, None);
    assert!(actor.list_rooms().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_first_departure_keeps_room() {
    let actor = relay();
    let (a, mut b) = seated_pair(&actor, "r1").await;
    let a_identity = a.identity().clone();

    a.disconnect().await;
    b.expect_event(ServerEvent::PeerLeft {
        identity: a_identity,
    })
    .await;

    assert_eq!(participant_count(&actor, "r1").await, Some(1));
}

#[tokio::test]
async fn test_unreported_departure_frees_seat_on_next_join() {
    let actor = relay();
    let (mut a, b) = seated_pair(&actor, "r1").await;
    let b_identity = b.identity().clone();

    b.drop_socket();
    assert_eq!(participant_count(&actor, "r1").await, Some(2));

    let mut c = TestClient::connect(&actor).await;
    c.join("r1").await;
    let (room_id, peers) = c.expect_joined().await;
    assert_eq!(room_id, "r1");
    assert_eq!(peers, vec![a.identity().clone()]);
    c.expect_event(ServerEvent::Ready {
        peer_identity: a.identity().clone(),
    })
    .await;

    a.expect_event(ServerEvent::PeerLeft {
        identity: b_identity,
    })
    .await;
    let ServerEvent::PeerJoined { identity, .. } = a.next_event().await else {
        unreachable!("expected peer-joined");
    };
    assert_eq!(&identity, c.identity());
    a.expect_event(ServerEvent::Ready {
        peer_identity: c.identity().clone(),
    })
    .await;

    assert_eq!(participant_count(&actor, "r1").await, Some(2));
}

#[tokio::test]
async fn test_last_departure_removes_room_and_binding() {
    let actor = relay();
    let mut a = TestClient::connect(&actor).await;
    let mut b = TestClient::connect(&actor).await;

    a.join_appointment("appt-1", None).await;
    let (room_a, _) = a.expect_joined().await;
    a.expect_event(ServerEvent::Waiting).await;
    b.join_appointment("appt-1", None).await;
    let (room_b, _) = b.expect_joined().await;
    assert_eq!(room_a, room_b, "appointment resolves to one room");

    let rooms = actor.list_rooms().await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].appointment_id.as_deref(), Some("appt-1"));

    a.disconnect().await;
    b.disconnect().await;

    assert!(actor.list_rooms().await.unwrap().is_empty());

    // Binding is gone: the appointment maps to a fresh room
    let mut c = TestClient::connect(&actor).await;
    c.join_appointment("appt-1", None).await;
    let (room_c, _) = c.expect_joined().await;
    assert_ne!(room_c, room_a);
}

#[tokio::test]
async fn test_end_call_terminates_once() {
    let actor = relay();
    let (mut a, mut b) = seated_pair(&actor, "r1").await;

    a.end_call().await;
    a.expect_event(ServerEvent::CallEnded).await;
    b.expect_event(ServerEvent::CallEnded).await;
    assert_eq!(participant_count(&actor, "r1").await, None);

    // Neither is in a room any more; repeating is a silent no-op
    a.end_call().await;
    b.end_call().await;
    a.expect_silence(QUIET).await;
    b.expect_silence(QUIET).await;

    // Connections stay usable
    a.join("r1").await;
    a.expect_joined().await;
}

#[tokio::test]
async fn test_room_exists_iff_it_has_participants() {
    let actor = relay();
    let mut a = TestClient::connect(&actor).await;
    assert!(actor.list_rooms().await.unwrap().is_empty());

    a.join("r1").await;
    a.expect_joined().await;
    assert_eq!(participant_count(&actor, "r1").await, Some(1));

    a.leave_room().await;
    // Round-trip through the actor so the leave is processed
    assert_eq!(participant_count(&actor, "r1").await, None);
    assert!(a.is_live(), "leave-room keeps the connection");
}

#[tokio::test]
async fn test_leave_room_notifies_peer_and_allows_rejoin() {
    let actor = relay();
    let (mut a, mut b) = seated_pair(&actor, "r1").await;

    a.leave_room().await;
    b.expect_event(ServerEvent::PeerLeft {
        identity: a.identity().clone(),
    })
    .await;

    a.join("r2").await;
    let (room_id, _) = a.expect_joined().await;
    assert_eq!(room_id, "r2");
    a.expect_event(ServerEvent::Waiting).await;
}

#[tokio::test]
async fn test_concurrent_joins_respect_capacity() {
    let gate = Arc::new(MockGate::allowing().held());
    let actor = SignalingActorHandle::new(
        "sg-it".to_string(),
        Some(Arc::clone(&gate) as _),
        Duration::from_secs(5),
    );

    let mut clients = Vec::new();
    for _ in 0..5 {
        clients.push(TestClient::connect(&actor).await);
    }
    for client in &clients {
        client.join("busy").await;
    }
    gate.release(5);

    let mut admitted = 0;
    let mut full = 0;
    for client in &mut clients {
        let event = client.next_event().await;
        match event {
            ServerEvent::JoinedRoom { .. } => admitted += 1,
            ServerEvent::RoomFull => full += 1,
            other => unreachable!("unexpected {other:?}"),
        }
    }
    assert_eq!(admitted, 2);
    assert_eq!(full, 3);
    assert_eq!(participant_count(&actor, "busy").await, Some(2));
}

#[tokio::test]
async fn test_appointment_bindings_are_one_to_one() {
    let actor = relay();
    let mut clients = Vec::new();
    for appointment in ["appt-a", "appt-b", "appt-c"] {
        let mut client = TestClient::connect(&actor).await;
        client.join_appointment(appointment, None).await;
        client.expect_joined().await;
        clients.push(client);
    }

    let rooms = actor.list_rooms().await.unwrap();
    assert_eq!(rooms.len(), 3);

    let mut appointments: Vec<_> = rooms
        .iter()
        .map(|r| r.appointment_id.clone().unwrap())
        .collect();
    appointments.sort();
    appointments.dedup();
    assert_eq!(appointments.len(), 3, "each room has its own appointment");

    let mut room_ids: Vec<_> = rooms.iter().map(|r| r.room_id.clone()).collect();
    room_ids.dedup();
    assert_eq!(room_ids.len(), 3, "each appointment has its own room");
}

#[tokio::test]
async fn test_negotiation_reaches_only_target() {
    let actor = relay();
    let (mut a, mut b) = seated_pair(&actor, "r1").await;
    let mut outsider = TestClient::connect(&actor).await;

    a.offer(b.identity(), json!({"sdp": "offer"})).await;
    b.expect_event(ServerEvent::Offer {
        payload: json!({"sdp": "offer"}),
        from: a.identity().clone(),
    })
    .await;

    b.answer(a.identity(), json!({"sdp": "answer"})).await;
    a.expect_event(ServerEvent::Answer {
        payload: json!({"sdp": "answer"}),
        from: b.identity().clone(),
    })
    .await;

    a.ice_candidate(b.identity(), json!({"candidate": "c1"})).await;
    b.expect_named("ice-candidate").await;

    // Self-addressed and unknown targets are dropped silently
    a.offer(a.identity(), json!({})).await;
    a.offer(&common::types::Identity::new("nobody"), json!({}))
        .await;

    a.expect_silence(QUIET).await;
    b.expect_silence(QUIET).await;
    outsider.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_chat_fans_out_to_others_only() {
    let actor = relay();
    let (mut a, mut b) = seated_pair(&actor, "r1").await;

    a.chat("r1", "hello").await;
    let ServerEvent::ChatMessage { from, message, .. } = b.next_event().await else {
        unreachable!("expected chat-message");
    };
    assert_eq!(&from, a.identity());
    assert_eq!(message, "hello");
    a.expect_silence(QUIET).await;

    // Empty text and unknown rooms are dropped
    a.send(ClientEvent::ChatMessage(ChatRequest {
        room_id: Some("r1".to_string()),
        message: Some(String::new()),
        meta: None,
    }))
    .await;
    a.chat("elsewhere", "hi").await;
    b.expect_silence(QUIET).await;
}

#[tokio::test]
async fn test_status_counts_connections_and_rooms() {
    let actor = relay();
    let (_a, _b) = seated_pair(&actor, "r1").await;
    let _c = TestClient::connect(&actor).await;

    let status = actor.get_status().await.unwrap();
    assert_eq!(status.connections, 3);
    assert_eq!(status.rooms, 1);
    assert_eq!(status.pending_admissions, 0);
    assert!(status.messages_processed > 0);
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let actor = relay();
    let mut a = TestClient::connect(&actor).await;

    actor.cancel();
    a.expect_closed().await;
    assert!(!a.is_live());
}
