//! Identifier newtypes for the signaling relay.
//!
//! Three identifiers move through the system and are easy to mix up when they
//! are all `String`s:
//!
//! - [`ConnectionId`]: the transport-level handle, minted when a socket is
//!   accepted and owned by the transport layer.
//! - [`Identity`]: the opaque token peers use to address each other. Issued by
//!   the identity registry, scoped to one connection.
//! - [`RoomId`]: the key of a call room, either client-supplied or minted for
//!   an appointment.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transport-level connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Connection-scoped identity used for addressed signaling.
///
/// Reconnecting yields a new identity; callers wanting continuity carry an
/// external user id alongside.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an already-issued identity token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a call room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap a room key verbatim.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh room key for an appointment binding.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("room-{}", Uuid::new_v4()))
    }

    /// Borrow the key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
