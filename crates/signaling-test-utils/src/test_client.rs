//! In-process signaling client.
//!
//! Registers a `ConnectionHandle` with a `SignalingActorHandle` and reads the
//! outbound queue directly, so room and relay behaviour can be tested without
//! a socket.

use std::time::Duration;

use common::secret::SecretString;
use common::types::{ConnectionId, Identity};
use serde_json::Value;
use signaling_service::actors::{ConnectionHandle, SignalingActorHandle};
use signaling_service::protocol::{
    ChatRequest, ClientEvent, JoinRoomRequest, RelayRequest, ServerEvent,
};
use tokio::sync::mpsc;

use crate::EVENT_TIMEOUT;

const CLIENT_BUFFER: usize = 64;

/// One connected client.
pub struct TestClient {
    actor: SignalingActorHandle,
    connection_id: ConnectionId,
    identity: Identity,
    handle: ConnectionHandle,
    rx: mpsc::Receiver<ServerEvent>,
}

impl TestClient {
    /// Connect and consume the `connected` event.
    pub async fn connect(actor: &SignalingActorHandle) -> Self {
        let connection_id = ConnectionId::new();
        let (handle, mut rx) =
            ConnectionHandle::channel(connection_id, CLIENT_BUFFER, actor.child_token());
        let identity = actor
            .connect(handle.clone())
            .await
            .expect("connect should succeed");

        let connected = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for connected")
            .expect("connection closed before connected");
        assert_eq!(
            connected,
            ServerEvent::Connected {
                identity: identity.clone()
            }
        );

        Self {
            actor: actor.clone(),
            connection_id,
            identity,
            handle,
            rx,
        }
    }

    /// Identity assigned at connect.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Whether the relay still considers this connection live.
    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    /// Send an event to the actor.
    pub async fn send(&self, event: ClientEvent) {
        self.actor
            .dispatch(self.connection_id, event)
            .await
            .expect("dispatch should succeed");
    }

    /// Join `room_id` with no credential.
    pub async fn join(&self, room_id: &str) {
        self.join_with(JoinRoomRequest {
            room_id: Some(room_id.to_string()),
            ..Default::default()
        })
        .await;
    }

    /// Join `appointment_id` presenting `credential`.
    pub async fn join_appointment(&self, appointment_id: &str, credential: Option<&str>) {
        self.join_with(JoinRoomRequest {
            appointment_id: Some(appointment_id.to_string()),
            credential: credential.map(SecretString::from),
            ..Default::default()
        })
        .await;
    }

    pub async fn join_with(&self, request: JoinRoomRequest) {
        self.send(ClientEvent::JoinRoom(request)).await;
    }

    /// Send an offer to `target`.
    pub async fn offer(&self, target: &Identity, payload: Value) {
        self.send(ClientEvent::Offer(RelayRequest {
            target: target.clone(),
            payload,
        }))
        .await;
    }

    /// Send an answer to `target`.
    pub async fn answer(&self, target: &Identity, payload: Value) {
        self.send(ClientEvent::Answer(RelayRequest {
            target: target.clone(),
            payload,
        }))
        .await;
    }

    /// Send a network-path candidate to `target`.
    pub async fn ice_candidate(&self, target: &Identity, payload: Value) {
        self.send(ClientEvent::IceCandidate(RelayRequest {
            target: target.clone(),
            payload,
        }))
        .await;
    }

    /// Broadcast a chat message into `room_id`.
    pub async fn chat(&self, room_id: &str, message: &str) {
        self.send(ClientEvent::ChatMessage(ChatRequest {
            room_id: Some(room_id.to_string()),
            message: Some(message.to_string()),
            meta: None,
        }))
        .await;
    }

    pub async fn end_call(&self) {
        self.send(ClientEvent::EndCall).await;
    }

    pub async fn leave_room(&self) {
        self.send(ClientEvent::LeaveRoom).await;
    }

    /// Next event, failing the test after [`EVENT_TIMEOUT`].
    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
    }

    /// Next event, asserting equality.
    pub async fn expect_event(&mut self, expected: ServerEvent) {
        let event = self.next_event().await;
        assert_eq!(event, expected, "unexpected event for {}", self.identity);
    }

    /// Next event, asserting its wire name.
    pub async fn expect_named(&mut self, name: &str) -> ServerEvent {
        let event = self.next_event().await;
        assert_eq!(event.name(), name, "unexpected event {event:?}");
        event
    }

    /// Consume `joined-room` and return its `room_id` and peers' identities.
    pub async fn expect_joined(&mut self) -> (String, Vec<Identity>) {
        match self.next_event().await {
            ServerEvent::JoinedRoom { room_id, peers, .. } => {
                (room_id, peers.into_iter().map(|p| p.identity).collect())
            }
            other => panic!("expected joined-room, got {other:?}"),
        }
    }

    /// Assert nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(event)) = tokio::time::timeout(window, self.rx.recv()).await {
            panic!("expected no event for {}, got {event:?}", self.identity);
        }
    }

    /// Drop the socket side and report the disconnect.
    pub async fn disconnect(self) {
        let Self {
            actor,
            connection_id,
            rx,
            ..
        } = self;
        drop(rx);
        actor
            .disconnect(connection_id)
            .await
            .expect("disconnect should succeed");
    }

    /// Drop the socket side without reporting the disconnect, leaving a
    /// stale seat behind.
    pub fn drop_socket(self) {
        drop(self.rx);
    }

    /// Wait until the relay closes this connection.
    pub async fn expect_closed(&mut self) {
        tokio::time::timeout(EVENT_TIMEOUT, self.handle.cancel_token().cancelled())
            .await
            .expect("connection was not closed");
    }
}
