//! Identity Registry - connection-scoped identities for addressed signaling.
//!
//! Maintains the bijection `Identity <-> ConnectionHandle`:
//!
//! - **Assign**: 128 bits from the OS CSPRNG (`ring::rand::SystemRandom`),
//!   hex-encoded, re-drawn on collision with a live identity
//! - **Resolve**: identity to connection handle
//! - **Revoke**: removes both directions for a connection
//!
//! Identities are not user-scoped: a reconnect yields a fresh identity.
//! Clients that want continuity carry an `externalUserId` themselves.

use crate::actors::connection::ConnectionHandle;
use crate::errors::SignalingError;

use common::types::{ConnectionId, Identity};
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Identity token length in bytes before hex encoding.
const IDENTITY_BYTES: usize = 16;

/// Draws attempted before giving up on a collision-free identity.
const MAX_ASSIGN_ATTEMPTS: usize = 4;

/// Bidirectional identity/connection mapping.
pub struct IdentityRegistry {
    by_identity: HashMap<Identity, ConnectionHandle>,
    by_connection: HashMap<ConnectionId, Identity>,
    rng: SystemRandom,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_identity: HashMap::new(),
            by_connection: HashMap::new(),
            rng: SystemRandom::new(),
        }
    }

    /// Issue an identity for a connection.
    ///
    /// Assigning an already-registered connection returns its existing identity.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::Internal` if the entropy source fails or no
    /// collision-free token is drawn.
    pub fn assign(&mut self, handle: ConnectionHandle) -> Result<Identity, SignalingError> {
        let connection_id = handle.connection_id();
        if let Some(existing) = self.by_connection.get(&connection_id) {
            return Ok(existing.clone());
        }

        for _ in 0..MAX_ASSIGN_ATTEMPTS {
            let identity = self.generate()?;
            if self.by_identity.contains_key(&identity) {
                warn!(target: "sg.identity", "Identity collision, drawing again");
                continue;
            }

            self.by_connection.insert(connection_id, identity.clone());
            self.by_identity.insert(identity.clone(), handle);

            debug!(
                target: "sg.identity",
                connection_id = %connection_id,
                identity = %identity,
                "Identity assigned"
            );
            return Ok(identity);
        }

        Err(SignalingError::Internal(
            "could not draw a unique identity".to_string(),
        ))
    }

    /// Resolve an identity to its connection handle.
    #[must_use]
    pub fn resolve(&self, identity: &Identity) -> Option<&ConnectionHandle> {
        self.by_identity.get(identity)
    }

    /// Resolve an identity to a handle whose connection is still live.
    #[must_use]
    pub fn resolve_live(&self, identity: &Identity) -> Option<&ConnectionHandle> {
        self.resolve(identity).filter(|handle| handle.is_live())
    }

    /// Whether the identity is registered and its connection live.
    #[must_use]
    pub fn is_live(&self, identity: &Identity) -> bool {
        self.resolve_live(identity).is_some()
    }

    /// Identity currently assigned to a connection.
    #[must_use]
    pub fn identity_of(&self, connection_id: ConnectionId) -> Option<&Identity> {
        self.by_connection.get(&connection_id)
    }

    /// Remove both directions of the mapping for a connection.
    ///
    /// Returns the revoked identity, or `None` if the connection was unknown.
    pub fn revoke(&mut self, connection_id: ConnectionId) -> Option<Identity> {
        let identity = self.by_connection.remove(&connection_id)?;
        self.by_identity.remove(&identity);
        debug!(
            target: "sg.identity",
            connection_id = %connection_id,
            identity = %identity,
            "Identity revoked"
        );
        Some(identity)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    /// All registered handles (used for shutdown).
    pub fn handles(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.by_identity.values()
    }

    fn generate(&self) -> Result<Identity, SignalingError> {
        let mut bytes = [0u8; IDENTITY_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| SignalingError::Internal("entropy source unavailable".to_string()))?;
        Ok(Identity::new(hex::encode(bytes)))
    }
}
