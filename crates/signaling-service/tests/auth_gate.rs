//! Authorization Gate integration tests.
//!
//! Joins are admitted through the real HTTP gate client against a wiremock
//! gate. Every gate failure must deny the join.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use signaling_service::actors::SignalingActorHandle;
use signaling_service::gate::HttpAuthorizationGate;
use signaling_service::protocol::{JoinRoomRequest, ServerEvent};
use signaling_test_utils::{MockAuthGate, TestClient};

const GATE_TIMEOUT: Duration = Duration::from_millis(300);

fn gated_relay(gate: &MockAuthGate) -> SignalingActorHandle {
    let client = HttpAuthorizationGate::new(&gate.url(), GATE_TIMEOUT).unwrap();
    SignalingActorHandle::new("sg-it".to_string(), Some(Arc::new(client)), GATE_TIMEOUT)
}

#[tokio::test]
async fn test_allowed_join_takes_gate_role() {
    let gate = MockAuthGate::start().await;
    gate.allow_credential("appt-1", "secret-a", Some("host"))
        .await;
    let actor = gated_relay(&gate);

    let mut a = TestClient::connect(&actor).await;
    a.join_with(JoinRoomRequest {
        appointment_id: Some("appt-1".to_string()),
        credential: Some("secret-a".into()),
        role: Some("guest".to_string()),
        ..Default::default()
    })
    .await;
    a.expect_joined().await;

    let rooms = actor.list_rooms().await.unwrap();
    assert_eq!(rooms[0].participants[0].role.as_deref(), Some("host"));
    assert_eq!(
        gate.received_authorizations().await,
        vec![Some("Bearer secret-a".to_string())]
    );
}

#[tokio::test]
async fn test_wrong_credential_is_denied() {
    let gate = MockAuthGate::start().await;
    gate.allow_credential("appt-1", "secret-a", None).await;
    let actor = gated_relay(&gate);

    let mut a = TestClient::connect(&actor).await;
    a.join_appointment("appt-1", Some("secret-b")).await;
    a.expect_event(ServerEvent::JoinDenied).await;
    assert!(actor.list_rooms().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_credential_sends_no_header() {
    let gate = MockAuthGate::start().await;
    gate.allow("r1", None).await;
    let actor = gated_relay(&gate);

    let mut a = TestClient::connect(&actor).await;
    a.join("r1").await;
    a.expect_joined().await;
    assert_eq!(gate.received_authorizations().await, vec![None]);
}

#[tokio::test]
async fn test_gate_refusal_denies() {
    let gate = MockAuthGate::start().await;
    gate.deny("appt-1").await;
    let actor = gated_relay(&gate);

    let mut a = TestClient::connect(&actor).await;
    a.join_appointment("appt-1", Some("secret")).await;
    a.expect_event(ServerEvent::JoinDenied).await;
}

#[tokio::test]
async fn test_gate_errors_fail_closed() {
    let gate = MockAuthGate::start().await;
    gate.fail("appt-500", 500).await;
    gate.fail("appt-401", 401).await;
    let actor = gated_relay(&gate);

    // 5xx, 4xx and unmatched (404) all deny
    for appointment in ["appt-500", "appt-401", "appt-unknown"] {
        let mut client = TestClient::connect(&actor).await;
        client.join_appointment(appointment, Some("secret")).await;
        client.expect_event(ServerEvent::JoinDenied).await;
    }
    assert!(actor.list_rooms().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_slow_gate_times_out_and_denies() {
    let gate = MockAuthGate::start().await;
    gate.allow_after("appt-slow", GATE_TIMEOUT * 4).await;
    let actor = gated_relay(&gate);

    let mut a = TestClient::connect(&actor).await;
    a.join_appointment("appt-slow", Some("secret")).await;
    a.expect_event(ServerEvent::JoinDenied).await;
}

#[tokio::test]
async fn test_unreachable_gate_denies() {
    // Nothing listens on the discard port
    let client = HttpAuthorizationGate::new("http://127.0.0.1:9", GATE_TIMEOUT).unwrap();
    let actor =
        SignalingActorHandle::new("sg-it".to_string(), Some(Arc::new(client)), GATE_TIMEOUT);

    let mut a = TestClient::connect(&actor).await;
    a.join("r1").await;
    a.expect_event(ServerEvent::JoinDenied).await;
}

#[tokio::test]
async fn test_denied_appointment_leaves_no_binding() {
    let gate = MockAuthGate::start().await;
    gate.allow_credential("appt-1", "good", None).await;
    let actor = gated_relay(&gate);

    let mut a = TestClient::connect(&actor).await;
    a.join_appointment("appt-1", Some("bad")).await;
    a.expect_event(ServerEvent::JoinDenied).await;
    assert!(actor.list_rooms().await.unwrap().is_empty());

    let mut b = TestClient::connect(&actor).await;
    b.join_appointment("appt-1", Some("good")).await;
    let (room_id, peers) = b.expect_joined().await;
    assert!(peers.is_empty());

    let rooms = actor.list_rooms().await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].room_id, room_id);
    assert_eq!(rooms[0].appointment_id.as_deref(), Some("appt-1"));
    assert_eq!(gate.request_count().await, 2);
}
