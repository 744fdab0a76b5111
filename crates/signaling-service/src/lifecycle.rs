//! Call Lifecycle - call start times and explicit call termination.
//!
//! The start time is set once, on the first admission into a room, and
//! survives until the room is destroyed. Every joiner of the same call sees
//! the same value.

use crate::identity::IdentityRegistry;
use crate::observability::metrics;
use crate::protocol::ServerEvent;
use crate::rooms::RoomManager;

use chrono::{DateTime, Utc};
use common::types::RoomId;
use std::collections::HashMap;
use tracing::debug;

/// Summary of a terminated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndedCall {
    /// Room that was closed.
    pub room_id: RoomId,
    /// Participants notified with `call-ended`.
    pub notified: usize,
    /// Call start time, if one was recorded.
    pub started_at: Option<DateTime<Utc>>,
}

/// Per-room call clocks.
#[derive(Debug, Default)]
pub struct CallLifecycle {
    started: HashMap<RoomId, DateTime<Utc>>,
}

impl CallLifecycle {
    /// Create an empty lifecycle table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room's start time, recording `now` if none exists.
    pub fn start(&mut self, room_id: &RoomId, now: DateTime<Utc>) -> DateTime<Utc> {
        *self.started.entry(room_id.clone()).or_insert_with(|| {
            debug!(target: "sg.actor", room_id = %room_id, "Call clock started");
            now
        })
    }

    /// Start time of the room's call.
    #[must_use]
    pub fn started_at(&self, room_id: &RoomId) -> Option<DateTime<Utc>> {
        self.started.get(room_id).copied()
    }

    /// Drop the room's clock.
    pub fn clear(&mut self, room_id: &RoomId) -> Option<DateTime<Utc>> {
        self.started.remove(room_id)
    }

    /// Terminate the call in `room_id` for every participant.
    ///
    /// Sends `call-ended` to each member, clears the clock, then removes the
    /// memberships and the room. Returns `None` if the room does not exist.
    pub fn end_call(
        &mut self,
        room_id: &RoomId,
        rooms: &mut RoomManager,
        identities: &IdentityRegistry,
    ) -> Option<EndedCall> {
        if !rooms.contains(room_id) {
            self.clear(room_id);
            return None;
        }

        let notified = rooms
            .members(room_id)
            .iter()
            .filter_map(|identity| identities.resolve_live(identity))
            .filter(|handle| handle.deliver(ServerEvent::CallEnded))
            .count();

        let started_at = self.clear(room_id);
        rooms.close_room(room_id);

        metrics::record_call_ended("end_call");

        Some(EndedCall {
            room_id: room_id.clone(),
            notified,
            started_at,
        })
    }
}
