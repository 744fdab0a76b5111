//! Wire protocol for the signaling WebSocket.
//!
//! Every frame is a JSON object tagged by `event`, with the event's fields
//! alongside the tag in camelCase:
//!
//! ```text
//! {"event": "join-room", "roomId": "r1", "credential": "..."}
//! {"event": "offer", "target": "9f2c...", "payload": {...}}
//! {"event": "peer-joined", "identity": "9f2c...", "role": "host"}
//! ```
//!
//! Negotiation payloads and chat `meta` are carried as opaque JSON values.

use common::secret::SecretString;
use common::types::Identity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events sent by clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join (or create) a room.
    JoinRoom(JoinRoomRequest),
    /// Session description offer for one peer.
    Offer(RelayRequest),
    /// Session description answer for one peer.
    Answer(RelayRequest),
    /// Network-path candidate for one peer.
    IceCandidate(RelayRequest),
    /// Chat message for the rest of the room.
    ChatMessage(ChatRequest),
    /// Terminate the call for everyone in the sender's room.
    EndCall,
    /// Leave the current room but keep the connection.
    LeaveRoom,
}

/// Payload of `join-room`.
///
/// Empty strings are treated as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Explicit room key.
    #[serde(default)]
    pub room_id: Option<String>,
    /// External appointment reference, resolved to a room key.
    #[serde(default)]
    pub appointment_id: Option<String>,
    /// Bearer credential forwarded to the Authorization Gate.
    #[serde(default, alias = "token")]
    pub credential: Option<SecretString>,
    /// Requested role; the gate's role wins when it supplies one.
    #[serde(default)]
    pub role: Option<String>,
    /// Caller-supplied stable user id.
    #[serde(default)]
    pub external_user_id: Option<String>,
}

impl JoinRoomRequest {
    /// Explicit room id, if non-empty.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        non_empty(self.room_id.as_deref())
    }

    /// Appointment id, if non-empty.
    #[must_use]
    pub fn appointment_id(&self) -> Option<&str> {
        non_empty(self.appointment_id.as_deref())
    }
}

/// Payload of `offer`, `answer` and `ice-candidate`.
#[derive(Debug, Deserialize)]
pub struct RelayRequest {
    /// Identity of the peer to deliver to.
    #[serde(alias = "to")]
    pub target: Identity,
    /// Opaque negotiation payload.
    #[serde(alias = "offer", alias = "answer", alias = "candidate")]
    pub payload: Value,
}

/// Payload of `chat-message`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Room to broadcast into.
    #[serde(default)]
    pub room_id: Option<String>,
    /// Message text.
    #[serde(default)]
    pub message: Option<String>,
    /// Opaque client metadata.
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Peer description carried in `joined-room` and `peer-joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    /// Peer identity.
    pub identity: Identity,
    /// Peer role, if known.
    pub role: Option<String>,
    /// Peer's external user id, if supplied.
    pub external_user_id: Option<String>,
}

/// Events sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Sent once when the connection is registered.
    Connected { identity: Identity },
    /// Join accepted.
    JoinedRoom {
        room_id: String,
        identity: Identity,
        peers: Vec<PeerInfo>,
        /// Unix epoch milliseconds.
        call_started_at: i64,
    },
    /// The joiner is alone in the room.
    Waiting,
    /// Both parties are present; start negotiating with `peer_identity`.
    Ready { peer_identity: Identity },
    /// Another participant joined the room.
    PeerJoined {
        identity: Identity,
        role: Option<String>,
        external_user_id: Option<String>,
    },
    /// A participant left the room.
    PeerLeft { identity: Identity },
    /// Join rejected: room already has two participants.
    RoomFull,
    /// Join rejected by the Authorization Gate.
    JoinDenied,
    /// The request could not be processed.
    InvalidRequest { reason: String },
    /// Relayed offer.
    Offer { payload: Value, from: Identity },
    /// Relayed answer.
    Answer { payload: Value, from: Identity },
    /// Relayed network-path candidate.
    IceCandidate { payload: Value, from: Identity },
    /// Chat message from another participant.
    ChatMessage {
        from: Identity,
        message: String,
        meta: Option<Value>,
        /// Unix epoch milliseconds.
        timestamp: i64,
    },
    /// The call was ended; room membership is gone.
    CallEnded,
}

impl ServerEvent {
    /// Bounded event name for logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::JoinedRoom { .. } => "joined-room",
            ServerEvent::Waiting => "waiting",
            ServerEvent::Ready { .. } => "ready",
            ServerEvent::PeerJoined { .. } => "peer-joined",
            ServerEvent::PeerLeft { .. } => "peer-left",
            ServerEvent::RoomFull => "room-full",
            ServerEvent::JoinDenied => "join-denied",
            ServerEvent::InvalidRequest { .. } => "invalid-request",
            ServerEvent::Offer { .. } => "offer",
            ServerEvent::Answer { .. } => "answer",
            ServerEvent::IceCandidate { .. } => "ice-candidate",
            ServerEvent::ChatMessage { .. } => "chat-message",
            ServerEvent::CallEnded => "call-ended",
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
