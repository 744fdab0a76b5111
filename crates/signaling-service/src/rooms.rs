//! Room Manager - membership of two-party call rooms.
//!
//! Owns three tables and never exposes them raw:
//!
//! - `rooms`: room id to ordered participants (arrival order, at most two)
//! - appointment bindings: `appointment_id <-> room_id`, kept as a bijection
//!   through a forward and a reverse map
//! - `membership`: identity to the room it is in (one room per identity)
//!
//! # Invariants
//!
//! - A room in the table has one or two participants. Removing the last
//!   participant removes the room.
//! - An appointment id never maps to two rooms and a room is never bound to
//!   two appointments.
//!
//! Bindings may outlive their room while an admission for it is still queued.
//! The owner of the admission queues calls [`RoomManager::release_binding`]
//! once the room is gone and nothing is queued.

use crate::errors::SignalingError;
use crate::protocol::PeerInfo;

use chrono::{DateTime, Utc};
use common::types::{Identity, RoomId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Maximum participants per room.
pub const ROOM_CAPACITY: usize = 2;

/// A participant admitted to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Connection-scoped identity.
    pub identity: Identity,
    /// Role (gate-assigned, else client-requested).
    pub role: Option<String>,
    /// Caller-supplied stable user id.
    pub external_user_id: Option<String>,
    /// Admission time.
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Peer view sent to other participants.
    #[must_use]
    pub fn peer_info(&self) -> PeerInfo {
        PeerInfo {
            identity: self.identity.clone(),
            role: self.role.clone(),
            external_user_id: self.external_user_id.clone(),
        }
    }
}

/// Participant fields known before admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantDraft {
    /// Joining identity.
    pub identity: Identity,
    /// Requested role.
    pub role: Option<String>,
    /// Caller-supplied stable user id.
    pub external_user_id: Option<String>,
}

/// Outcome of room resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoom {
    /// Room key.
    pub room_id: RoomId,
    /// Appointment the join referenced, if any.
    pub appointment_id: Option<String>,
}

impl ResolvedRoom {
    /// Reference presented to the Authorization Gate: the appointment when
    /// there is one, else the room id.
    #[must_use]
    pub fn gate_reference(&self) -> &str {
        self.appointment_id
            .as_deref()
            .unwrap_or_else(|| self.room_id.as_str())
    }
}

/// Result of dropping participants whose connection is gone.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Identities removed from the room.
    pub evicted: Vec<Identity>,
    /// Whether the room was removed because nobody live remained.
    pub room_removed: bool,
}

/// Result of an admission attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// Participant added.
    Accepted {
        /// Peers already present, excluding the newcomer.
        peers: Vec<PeerInfo>,
        /// Whether this admission created the room.
        created: bool,
    },
    /// Room already at capacity.
    RoomFull,
}

/// A participant's removal from a room.
#[derive(Debug, PartialEq, Eq)]
pub struct Departure {
    /// Room the participant left.
    pub room_id: RoomId,
    /// Identities still in the room.
    pub remaining: Vec<Identity>,
    /// Whether the room was removed because it became empty.
    pub room_removed: bool,
}

#[derive(Debug)]
struct Room {
    participants: Vec<Participant>,
}

/// Owner of room, binding and membership state.
#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
    appointment_rooms: HashMap<String, RoomId>,
    room_appointments: HashMap<RoomId, String>,
    membership: HashMap<Identity, RoomId>,
}

impl RoomManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the room a join refers to.
    ///
    /// An explicit room id is used verbatim. Otherwise the appointment's bound
    /// room is returned, binding a freshly minted room id on first use.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::InvalidRequest` if neither reference is given.
    pub fn resolve_room(
        &mut self,
        explicit_room_id: Option<&str>,
        appointment_id: Option<&str>,
    ) -> Result<ResolvedRoom, SignalingError> {
        if let Some(room_id) = explicit_room_id {
            return Ok(ResolvedRoom {
                room_id: RoomId::new(room_id),
                appointment_id: appointment_id.map(str::to_string),
            });
        }

        let Some(appointment_id) = appointment_id else {
            return Err(SignalingError::InvalidRequest(
                "roomId or appointmentId is required".to_string(),
            ));
        };

        if let Some(room_id) = self.appointment_rooms.get(appointment_id) {
            return Ok(ResolvedRoom {
                room_id: room_id.clone(),
                appointment_id: Some(appointment_id.to_string()),
            });
        }

        let room_id = loop {
            let candidate = RoomId::generate();
            if !self.rooms.contains_key(&candidate)
                && !self.room_appointments.contains_key(&candidate)
            {
                break candidate;
            }
        };

        self.appointment_rooms
            .insert(appointment_id.to_string(), room_id.clone());
        self.room_appointments
            .insert(room_id.clone(), appointment_id.to_string());

        debug!(
            target: "sg.rooms",
            room_id = %room_id,
            "Appointment bound to new room"
        );

        Ok(ResolvedRoom {
            room_id,
            appointment_id: Some(appointment_id.to_string()),
        })
    }

    /// Drop participants whose connection is no longer live.
    ///
    /// Removes the room if nobody remains. Bindings are left in place for the
    /// admission that triggered reconciliation.
    pub fn reconcile(
        &mut self,
        room_id: &RoomId,
        is_live: impl Fn(&Identity) -> bool,
    ) -> Reconciliation {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Reconciliation::default();
        };

        let mut evicted = Vec::new();
        room.participants.retain(|p| {
            let live = is_live(&p.identity);
            if !live {
                evicted.push(p.identity.clone());
            }
            live
        });

        for identity in &evicted {
            self.membership.remove(identity);
            warn!(
                target: "sg.rooms",
                room_id = %room_id,
                identity = %identity,
                "Dropped stale participant"
            );
        }

        let room_removed = room.participants.is_empty();
        if room_removed {
            self.rooms.remove(room_id);
        }

        Reconciliation {
            evicted,
            room_removed,
        }
    }

    /// Add a participant to a resolved room.
    ///
    /// Call [`RoomManager::reconcile`] first; the capacity check counts every
    /// participant still present.
    pub fn admit(
        &mut self,
        resolved: &ResolvedRoom,
        draft: ParticipantDraft,
        now: DateTime<Utc>,
    ) -> Admission {
        let room_id = &resolved.room_id;

        if self
            .rooms
            .get(room_id)
            .is_some_and(|room| room.participants.len() >= ROOM_CAPACITY)
        {
            return Admission::RoomFull;
        }

        let created = !self.rooms.contains_key(room_id);
        let room = self.rooms.entry(room_id.clone()).or_insert_with(|| Room {
            participants: Vec::with_capacity(ROOM_CAPACITY),
        });

        let peers = room.participants.iter().map(Participant::peer_info).collect();

        self.membership
            .insert(draft.identity.clone(), room_id.clone());
        room.participants.push(Participant {
            identity: draft.identity,
            role: draft.role,
            external_user_id: draft.external_user_id,
            joined_at: now,
        });

        info!(
            target: "sg.rooms",
            room_id = %room_id,
            participants = room.participants.len(),
            created = created,
            "Participant admitted"
        );

        Admission::Accepted { peers, created }
    }

    /// Remove an identity from its room.
    ///
    /// Returns `None` if the identity is not in any room.
    pub fn remove_participant(&mut self, identity: &Identity) -> Option<Departure> {
        let room_id = self.membership.remove(identity)?;

        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Some(Departure {
                room_id,
                remaining: Vec::new(),
                room_removed: false,
            });
        };

        room.participants.retain(|p| &p.identity != identity);
        let remaining: Vec<Identity> =
            room.participants.iter().map(|p| p.identity.clone()).collect();

        let room_removed = remaining.is_empty();
        if room_removed {
            self.rooms.remove(&room_id);
        }

        debug!(
            target: "sg.rooms",
            room_id = %room_id,
            remaining = remaining.len(),
            room_removed = room_removed,
            "Participant removed"
        );

        Some(Departure {
            room_id,
            remaining,
            room_removed,
        })
    }

    /// Remove a room and every membership pointing at it.
    ///
    /// Returns the identities that were members, or `None` if the room was absent.
    pub fn close_room(&mut self, room_id: &RoomId) -> Option<Vec<Identity>> {
        let room = self.rooms.remove(room_id)?;
        let members: Vec<Identity> = room.participants.into_iter().map(|p| p.identity).collect();
        for identity in &members {
            self.membership.remove(identity);
        }
        Some(members)
    }

    /// Drop the appointment binding of a room that no longer exists.
    ///
    /// Returns `true` if a binding was removed. Live rooms keep their binding.
    pub fn release_binding(&mut self, room_id: &RoomId) -> bool {
        if self.rooms.contains_key(room_id) {
            return false;
        }
        match self.room_appointments.remove(room_id) {
            Some(appointment_id) => {
                self.appointment_rooms.remove(&appointment_id);
                debug!(
                    target: "sg.rooms",
                    room_id = %room_id,
                    "Appointment binding released"
                );
                true
            }
            None => false,
        }
    }

    /// Room an identity is currently in.
    #[must_use]
    pub fn room_of(&self, identity: &Identity) -> Option<&RoomId> {
        self.membership.get(identity)
    }

    /// Members of a room in arrival order.
    #[must_use]
    pub fn members(&self, room_id: &RoomId) -> Vec<Identity> {
        self.rooms
            .get(room_id)
            .map(|room| room.participants.iter().map(|p| p.identity.clone()).collect())
            .unwrap_or_default()
    }

    /// Participants of a room in arrival order.
    #[must_use]
    pub fn participants(&self, room_id: &RoomId) -> Option<&[Participant]> {
        self.rooms.get(room_id).map(|room| room.participants.as_slice())
    }

    /// Whether a room exists.
    #[must_use]
    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Room ids currently live.
    pub fn room_ids(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.keys()
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Appointment bound to a room.
    #[must_use]
    pub fn room_appointment(&self, room_id: &RoomId) -> Option<&str> {
        self.room_appointments.get(room_id).map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn draft(identity: &str) -> ParticipantDraft {
        ParticipantDraft {
            identity: Identity::new(identity),
            role: None,
            external_user_id: None,
        }
    }

    fn explicit(manager: &mut RoomManager, room: &str) -> ResolvedRoom {
        manager.resolve_room(Some(room), None).unwrap()
    }

    fn assert_bindings_bijective(manager: &RoomManager) {
        assert_eq!(
            manager.appointment_rooms.len(),
            manager.room_appointments.len()
        );
        for (appointment, room) in &manager.appointment_rooms {
            assert_eq!(
                manager.room_appointments.get(room).map(String::as_str),
                Some(appointment.as_str())
            );
        }
    }

    #[test]
    fn test_resolve_requires_a_reference() {
        let mut manager = RoomManager::new();
        let result = manager.resolve_room(None, None);
        assert!(matches!(result, Err(SignalingError::InvalidRequest(_))));
    }

    #[test]
    fn test_resolve_explicit_room_is_verbatim() {
        let mut manager = RoomManager::new();
        let resolved = manager.resolve_room(Some("r1"), Some("apt-1")).unwrap();
        assert_eq!(resolved.room_id, RoomId::new("r1"));
        assert_eq!(resolved.gate_reference(), "apt-1");
        // Explicit ids do not create bindings
        assert!(manager.appointment_rooms.get("apt-1").is_none());
    }

    #[test]
    fn test_resolve_appointment_is_stable() {
        let mut manager = RoomManager::new();
        let first = manager.resolve_room(None, Some("apt-1")).unwrap();
        let second = manager.resolve_room(None, Some("apt-1")).unwrap();
        let other = manager.resolve_room(None, Some("apt-2")).unwrap();

        assert_eq!(first.room_id, second.room_id);
        assert_ne!(first.room_id, other.room_id);
        assert_eq!(manager.appointment_rooms.get("apt-1"), Some(&first.room_id));
        assert_eq!(manager.room_appointment(&first.room_id), Some("apt-1"));
        assert_bindings_bijective(&manager);
    }

    #[test]
    fn test_admit_until_full() {
        let mut manager = RoomManager::new();
        let resolved = explicit(&mut manager, "r1");
        let now = Utc::now();

        let first = manager.admit(&resolved, draft("a"), now);
        assert_eq!(
            first,
            Admission::Accepted {
                peers: vec![],
                created: true
            }
        );

        let second = manager.admit(&resolved, draft("b"), now);
        let Admission::Accepted { peers, created } = second else {
            unreachable!("second participant should be admitted");
        };
        assert!(!created);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].identity, Identity::new("a"));

        assert_eq!(manager.admit(&resolved, draft("c"), now), Admission::RoomFull);
        assert_eq!(
            manager.members(&resolved.room_id),
            vec![Identity::new("a"), Identity::new("b")]
        );
        assert!(manager.room_of(&Identity::new("c")).is_none());
    }

    #[test]
    fn test_reconcile_drops_stale_participants() {
        let mut manager = RoomManager::new();
        let resolved = explicit(&mut manager, "r1");
        let now = Utc::now();
        manager.admit(&resolved, draft("a"), now);
        manager.admit(&resolved, draft("b"), now);

        let rec = manager.reconcile(&resolved.room_id, |id| id.as_str() != "a");
        assert_eq!(rec.evicted, vec![Identity::new("a")]);
        assert!(!rec.room_removed);
        assert!(manager.room_of(&Identity::new("a")).is_none());

        // Freed slot is usable
        assert!(matches!(
            manager.admit(&resolved, draft("c"), now),
            Admission::Accepted { .. }
        ));
    }

    #[test]
    fn test_reconcile_removes_room_when_nobody_is_live() {
        let mut manager = RoomManager::new();
        let resolved = explicit(&mut manager, "r1");
        manager.admit(&resolved, draft("a"), Utc::now());

        let rec = manager.reconcile(&resolved.room_id, |_| false);
        assert!(rec.room_removed);
        assert!(!manager.contains(&resolved.room_id));
    }

    #[test]
    fn test_remove_last_participant_removes_room() {
        let mut manager = RoomManager::new();
        let resolved = manager.resolve_room(None, Some("apt-1")).unwrap();
        let now = Utc::now();
        manager.admit(&resolved, draft("a"), now);
        manager.admit(&resolved, draft("b"), now);

        let departure = manager.remove_participant(&Identity::new("a")).unwrap();
        assert_eq!(departure.remaining, vec![Identity::new("b")]);
        assert!(!departure.room_removed);
        assert!(manager.contains(&resolved.room_id));

        let departure = manager.remove_participant(&Identity::new("b")).unwrap();
        assert!(departure.remaining.is_empty());
        assert!(departure.room_removed);
        assert_eq!(manager.room_count(), 0);

        // Binding survives until released by the admission owner
        assert!(manager.release_binding(&resolved.room_id));
        assert!(manager.appointment_rooms.get("apt-1").is_none());
        assert_bindings_bijective(&manager);
    }

    #[test]
    fn test_remove_unknown_participant_is_none() {
        let mut manager = RoomManager::new();
        assert!(manager.remove_participant(&Identity::new("ghost")).is_none());
    }

    #[test]
    fn test_release_binding_keeps_live_room() {
        let mut manager = RoomManager::new();
        let resolved = manager.resolve_room(None, Some("apt-1")).unwrap();
        manager.admit(&resolved, draft("a"), Utc::now());

        assert!(!manager.release_binding(&resolved.room_id));
        assert_eq!(manager.appointment_rooms.get("apt-1"), Some(&resolved.room_id));
    }

    #[test]
    fn test_close_room_clears_membership() {
        let mut manager = RoomManager::new();
        let resolved = explicit(&mut manager, "r1");
        let now = Utc::now();
        manager.admit(&resolved, draft("a"), now);
        manager.admit(&resolved, draft("b"), now);

        let members = manager.close_room(&resolved.room_id).unwrap();
        assert_eq!(members.len(), 2);
        assert!(manager.room_of(&Identity::new("a")).is_none());
        assert!(manager.room_of(&Identity::new("b")).is_none());
        assert!(!manager.contains(&resolved.room_id));

        // Closing again is a no-op
        assert!(manager.close_room(&resolved.room_id).is_none());
    }
}
