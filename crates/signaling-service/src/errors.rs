//! Signaling relay error types.
//!
//! Every join-path error maps to a named outbound event sent to the
//! originating connection. Internal details (gate URLs, status codes) are
//! logged server-side but never reach clients.

use crate::gate::AuthGateError;
use crate::protocol::ServerEvent;
use thiserror::Error;

/// Signaling relay error type.
///
/// Maps to outbound events:
/// - `InvalidRequest`: `invalid-request`
/// - `JoinDenied`, `AuthGate`: `join-denied`
/// - `RoomFull`: `room-full`
/// - `TargetUnreachable`: swallowed, nothing is sent
/// - `Internal`: nothing is sent
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Malformed request (e.g. join without room or appointment reference).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The Authorization Gate refused the join.
    #[error("Join denied: {0}")]
    JoinDenied(String),

    /// The Authorization Gate could not produce a verdict. Treated as denial.
    #[error("Authorization gate error: {0}")]
    AuthGate(String),

    /// Room already holds two live participants.
    #[error("Room is full")]
    RoomFull,

    /// Relay target has no live connection.
    #[error("Relay target unreachable")]
    TargetUnreachable,

    /// Internal error (channel failures, entropy source failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Returns the outbound event announcing this error to the originating
    /// connection, or `None` when the error is not surfaced.
    #[must_use]
    pub fn outbound_event(&self) -> Option<ServerEvent> {
        match self {
            SignalingError::InvalidRequest(_) => Some(ServerEvent::InvalidRequest {
                reason: self.client_message(),
            }),
            SignalingError::JoinDenied(_) | SignalingError::AuthGate(_) => {
                Some(ServerEvent::JoinDenied)
            }
            SignalingError::RoomFull => Some(ServerEvent::RoomFull),
            SignalingError::TargetUnreachable | SignalingError::Internal(_) => None,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SignalingError::InvalidRequest(msg) => msg.clone(),
            SignalingError::JoinDenied(_) | SignalingError::AuthGate(_) => {
                "Not allowed to join this room".to_string()
            }
            SignalingError::RoomFull => "Room is full".to_string(),
            SignalingError::TargetUnreachable => "Peer is not connected".to_string(),
            SignalingError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Bounded label for the `sg_joins_total` outcome dimension.
    #[must_use]
    pub const fn join_outcome(&self) -> &'static str {
        match self {
            SignalingError::InvalidRequest(_) => "invalid",
            SignalingError::JoinDenied(_) | SignalingError::AuthGate(_) => "denied",
            SignalingError::RoomFull => "room_full",
            SignalingError::TargetUnreachable | SignalingError::Internal(_) => "error",
        }
    }
}

impl From<AuthGateError> for SignalingError {
    fn from(err: AuthGateError) -> Self {
        SignalingError::AuthGate(err.to_string())
    }
}
