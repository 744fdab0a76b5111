//! Signaling Relay - addressed forwarding and room fan-out.
//!
//! Negotiation messages (`offer`, `answer`, `ice-candidate`) go to exactly
//! one target identity. Chat and room notifications fan out to every member
//! except the sender. Payloads are never inspected.
//!
//! The relay holds no state; it borrows the registry and room tables owned by
//! the signaling actor for the duration of one message.

use crate::errors::SignalingError;
use crate::identity::IdentityRegistry;
use crate::observability::metrics;
use crate::protocol::ServerEvent;
use crate::rooms::RoomManager;

use common::types::{Identity, RoomId};
use serde_json::Value;
use tracing::debug;

/// Addressed negotiation message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    /// Session description offer.
    Offer,
    /// Session description answer.
    Answer,
    /// Network-path candidate.
    IceCandidate,
}

impl RelayKind {
    /// Wire name, also used as a metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RelayKind::Offer => "offer",
            RelayKind::Answer => "answer",
            RelayKind::IceCandidate => "ice-candidate",
        }
    }

    /// Outbound event carrying `payload` from `from`.
    #[must_use]
    pub fn into_event(self, payload: Value, from: Identity) -> ServerEvent {
        match self {
            RelayKind::Offer => ServerEvent::Offer { payload, from },
            RelayKind::Answer => ServerEvent::Answer { payload, from },
            RelayKind::IceCandidate => ServerEvent::IceCandidate { payload, from },
        }
    }
}

/// A chat message as received from a client.
#[derive(Debug)]
pub struct ChatMessage<'a> {
    /// Room the sender addressed.
    pub room_id: Option<&'a str>,
    /// Message text.
    pub message: Option<&'a str>,
    /// Opaque client metadata.
    pub meta: Option<Value>,
    /// Server receive time, Unix epoch milliseconds.
    pub timestamp: i64,
}

/// Borrowed view used to route one message.
pub struct SignalingRelay<'a> {
    identities: &'a IdentityRegistry,
    rooms: &'a RoomManager,
}

impl<'a> SignalingRelay<'a> {
    /// Create a relay view.
    #[must_use]
    pub fn new(identities: &'a IdentityRegistry, rooms: &'a RoomManager) -> Self {
        Self { identities, rooms }
    }

    /// Forward a negotiation payload to one target identity.
    ///
    /// The receiver sees the sender's identity in `from`. Room membership is
    /// not required.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::TargetUnreachable` if the target is the sender,
    /// has no live connection, or its outbound queue rejected the event.
    /// Drops are counted here or by the connection handle.
    pub fn relay(
        &self,
        kind: RelayKind,
        sender: &Identity,
        target: &Identity,
        payload: Value,
    ) -> Result<(), SignalingError> {
        let handle = match self.identities.resolve_live(target) {
            Some(handle) if sender != target => handle,
            _ => {
                metrics::record_message_dropped("target_unreachable");
                return Err(SignalingError::TargetUnreachable);
            }
        };

        if !handle.deliver(kind.into_event(payload, sender.clone())) {
            return Err(SignalingError::TargetUnreachable);
        }

        metrics::record_message_relayed(kind.as_str());
        Ok(())
    }

    /// Broadcast a chat message to the addressed room.
    ///
    /// Dropped without error when the room id or message is missing. The
    /// sender need not be a member; it is never among the recipients.
    /// Returns the number of recipients reached.
    pub fn broadcast_chat(&self, sender: &Identity, chat: ChatMessage<'_>) -> usize {
        let Some(room_id) = chat.room_id.filter(|r| !r.is_empty()) else {
            metrics::record_message_dropped("malformed");
            return 0;
        };
        let Some(message) = chat.message.filter(|m| !m.is_empty()) else {
            metrics::record_message_dropped("empty_chat");
            return 0;
        };

        let room_id = RoomId::new(room_id);

        let event = ServerEvent::ChatMessage {
            from: sender.clone(),
            message: message.to_string(),
            meta: chat.meta,
            timestamp: chat.timestamp,
        };
        let reached = self.notify_others(&room_id, sender, &event);
        if reached > 0 {
            metrics::record_message_relayed("chat-message");
        }
        reached
    }

    /// Send an event to every live member of a room except `except`.
    ///
    /// Returns the number of members reached.
    pub fn notify_others(&self, room_id: &RoomId, except: &Identity, event: &ServerEvent) -> usize {
        self.notify(self.rooms.members(room_id).iter().filter(|m| *m != except), event)
    }

    /// Send an event to each listed identity that is still live.
    ///
    /// Returns the number of identities reached.
    pub fn notify<'i>(
        &self,
        recipients: impl IntoIterator<Item = &'i Identity>,
        event: &ServerEvent,
    ) -> usize {
        recipients
            .into_iter()
            .filter(|identity| self.send_to(identity, event.clone()))
            .count()
    }

    /// Send an event to one identity.
    ///
    /// Returns `false` if the identity has no live connection or the event
    /// was dropped.
    pub fn send_to(&self, identity: &Identity, event: ServerEvent) -> bool {
        match self.identities.resolve_live(identity) {
            Some(handle) => handle.deliver(event),
            None => {
                debug!(
                    target: "sg.relay",
                    identity = %identity,
                    event = event.name(),
                    "Recipient not live, event dropped"
                );
                false
            }
        }
    }
}
