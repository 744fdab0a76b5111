//! Message types for the signaling actor.
//!
//! Transport tasks talk to the actor through `tokio::sync::mpsc`. Queries
//! answer over `tokio::sync::oneshot`; client events are fire-and-forget
//! because every client-visible outcome is delivered as an outbound event.

use crate::actors::connection::ConnectionHandle;
use crate::errors::SignalingError;
use crate::gate::{AuthGateError, GateVerdict};
use crate::protocol::ClientEvent;

use common::types::{ConnectionId, Identity, RoomId};
use serde::Serialize;
use tokio::sync::oneshot;

/// Messages sent to `SignalingActor`.
#[derive(Debug)]
pub enum SignalingMessage {
    /// Register a new connection and issue its identity.
    Connect {
        handle: ConnectionHandle,
        /// Response channel for the issued identity.
        respond_to: oneshot::Sender<Result<Identity, SignalingError>>,
    },

    /// A parsed event from a connected client.
    Client {
        connection_id: ConnectionId,
        event: ClientEvent,
    },

    /// The transport observed the connection closing.
    Disconnect { connection_id: ConnectionId },

    /// Result of an Authorization Gate check spawned by the actor.
    GateVerdict {
        room_id: RoomId,
        /// Ticket of the admission the check belongs to.
        ticket: u64,
        result: Result<GateVerdict, AuthGateError>,
    },

    /// List live rooms.
    ListRooms {
        respond_to: oneshot::Sender<Vec<RoomSnapshot>>,
    },

    /// Describe one room.
    GetRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Option<RoomSnapshot>>,
    },

    /// Relay-wide counters.
    GetStatus {
        respond_to: oneshot::Sender<RelayStatus>,
    },
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Room key.
    pub room_id: String,
    /// Bound appointment, if the room was resolved from one.
    pub appointment_id: Option<String>,
    /// Call start, Unix epoch milliseconds.
    pub call_started_at: Option<i64>,
    /// Participants in arrival order.
    pub participants: Vec<ParticipantSnapshot>,
}

/// Point-in-time view of a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    /// Connection-scoped identity.
    pub identity: String,
    /// Assigned role.
    pub role: Option<String>,
    /// Caller-supplied stable user id.
    pub external_user_id: Option<String>,
    /// Admission time, Unix epoch milliseconds.
    pub joined_at: i64,
}

/// Relay-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    /// Registered connections.
    pub connections: usize,
    /// Live rooms.
    pub rooms: usize,
    /// Joins waiting for admission (queued or at the gate).
    pub pending_admissions: usize,
    /// Messages processed since start.
    pub messages_processed: u64,
}
