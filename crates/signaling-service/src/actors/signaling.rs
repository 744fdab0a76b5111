//! `SignalingActor` - single owner of all relay state.
//!
//! The actor owns the Identity Registry, the Room Manager and the Call
//! Lifecycle. Every mutation of those tables happens inside its message loop,
//! so each handler observes and updates them atomically.
//!
//! # Admission
//!
//! Joins for the same room are serialized through a per-room queue with at
//! most one Authorization Gate check in flight. The check runs in a spawned
//! task and reports back with a `GateVerdict` message, so a slow gate never
//! blocks other rooms. When the verdict arrives the actor:
//!
//! 1. Confirms the joiner's connection is still live
//! 2. Drops participants whose connections died (reconciliation)
//! 3. Checks capacity and inserts the participant
//!
//! Steps 2 and 3 run in one handler, so two concurrent joins can never both
//! take the last slot.
//!
//! # Disconnect
//!
//! The identity is revoked first, so no event can be routed to a dead
//! connection while the room is being cleaned up.

use super::connection::ConnectionHandle;
use super::messages::{ParticipantSnapshot, RelayStatus, RoomSnapshot, SignalingMessage};
use super::metrics::MailboxMonitor;
use crate::errors::SignalingError;
use crate::gate::{AuthGateError, AuthorizationGate, GateVerdict};
use crate::identity::IdentityRegistry;
use crate::lifecycle::CallLifecycle;
use crate::observability::metrics;
use crate::protocol::{ChatRequest, ClientEvent, JoinRoomRequest, RelayRequest, ServerEvent};
use crate::relay::{ChatMessage, RelayKind, SignalingRelay};
use crate::rooms::{Admission, ParticipantDraft, ResolvedRoom, RoomManager};

use chrono::Utc;
use common::secret::SecretString;
use common::types::{ConnectionId, Identity, RoomId};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the signaling mailbox.
const SIGNALING_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `SignalingActor`.
///
/// Cheap to clone; every transport task holds one.
#[derive(Clone)]
pub struct SignalingActorHandle {
    sender: mpsc::Sender<SignalingMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl SignalingActorHandle {
    /// Create a new `SignalingActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    ///
    /// # Arguments
    ///
    /// * `instance_id` - Relay instance ID for logs
    /// * `gate` - Authorization Gate; `None` admits every join
    /// * `gate_timeout` - Upper bound on one gate check
    #[must_use]
    pub fn new(
        instance_id: String,
        gate: Option<Arc<dyn AuthorizationGate>>,
        gate_timeout: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(SIGNALING_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();
        let mailbox = Arc::new(MailboxMonitor::new());

        let actor = SignalingActor {
            instance_id,
            receiver,
            self_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            identities: IdentityRegistry::new(),
            rooms: RoomManager::new(),
            lifecycle: CallLifecycle::new(),
            gate,
            gate_timeout,
            admissions: HashMap::new(),
            next_ticket: 0,
            mailbox: Arc::clone(&mailbox),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            mailbox,
        }
    }

    async fn send(&self, message: SignalingMessage) -> Result<(), SignalingError> {
        self.mailbox.record_enqueue();
        self.sender.send(message).await.map_err(|e| {
            self.mailbox.record_rollback();
            SignalingError::Internal(format!("channel send failed: {e}"))
        })
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> SignalingMessage,
    ) -> Result<T, SignalingError> {
        let (tx, rx) = oneshot::channel();
        self.send(message(tx)).await?;
        rx.await
            .map_err(|e| SignalingError::Internal(format!("response receive failed: {e}")))
    }

    /// Register a connection and return its identity.
    ///
    /// The connection receives `connected` before this returns.
    pub async fn connect(&self, handle: ConnectionHandle) -> Result<Identity, SignalingError> {
        self.request(|respond_to| SignalingMessage::Connect { handle, respond_to })
            .await?
    }

    /// Forward a client event. Outcomes are delivered to the client as events.
    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), SignalingError> {
        self.send(SignalingMessage::Client {
            connection_id,
            event,
        })
        .await
    }

    /// Report a closed connection.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), SignalingError> {
        self.send(SignalingMessage::Disconnect { connection_id })
            .await
    }

    /// Snapshot of every live room, ordered by room id.
    pub async fn list_rooms(&self) -> Result<Vec<RoomSnapshot>, SignalingError> {
        self.request(|respond_to| SignalingMessage::ListRooms { respond_to })
            .await
    }

    /// Snapshot of one room.
    pub async fn get_room(&self, room_id: RoomId) -> Result<Option<RoomSnapshot>, SignalingError> {
        self.request(|respond_to| SignalingMessage::GetRoom {
            room_id,
            respond_to,
        })
        .await
    }

    /// Relay-wide counters.
    pub async fn get_status(&self) -> Result<RelayStatus, SignalingError> {
        self.request(|respond_to| SignalingMessage::GetStatus { respond_to })
            .await
    }

    /// Cancel the actor (closes every connection).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for a connection.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// A join waiting for admission.
struct PendingJoin {
    ticket: u64,
    resolved: ResolvedRoom,
    draft: ParticipantDraft,
    credential: Option<SecretString>,
}

/// Per-room admission queue.
#[derive(Default)]
struct AdmissionQueue {
    /// Join whose gate check is running.
    in_flight: Option<PendingJoin>,
    /// Joins waiting behind it, in arrival order.
    waiting: VecDeque<PendingJoin>,
}

impl AdmissionQueue {
    fn len(&self) -> usize {
        self.waiting.len() + usize::from(self.in_flight.is_some())
    }

    fn holds(&self, identity: &Identity) -> bool {
        self.in_flight
            .iter()
            .chain(self.waiting.iter())
            .any(|p| &p.draft.identity == identity)
    }
}

/// The `SignalingActor` implementation.
pub struct SignalingActor {
    instance_id: String,
    receiver: mpsc::Receiver<SignalingMessage>,
    /// Weak so that dropping every handle stops the actor.
    self_sender: mpsc::WeakSender<SignalingMessage>,
    cancel_token: CancellationToken,
    identities: IdentityRegistry,
    rooms: RoomManager,
    lifecycle: CallLifecycle,
    gate: Option<Arc<dyn AuthorizationGate>>,
    gate_timeout: Duration,
    admissions: HashMap<RoomId, AdmissionQueue>,
    next_ticket: u64,
    mailbox: Arc<MailboxMonitor>,
}

impl SignalingActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "sg.actor", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "sg.actor",
            instance_id = %self.instance_id,
            gate_enabled = self.gate.is_some(),
            "SignalingActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sg.actor",
                        instance_id = %self.instance_id,
                        "SignalingActor received cancellation signal"
                    );
                    self.shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                        }
                        None => {
                            info!(
                                target: "sg.actor",
                                instance_id = %self.instance_id,
                                "SignalingActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sg.actor",
            instance_id = %self.instance_id,
            rooms_remaining = self.rooms.room_count(),
            messages_processed = self.mailbox.messages_processed(),
            "SignalingActor stopped"
        );
    }

    fn handle_message(&mut self, message: SignalingMessage) {
        match message {
            SignalingMessage::Connect { handle, respond_to } => {
                let result = self.handle_connect(handle);
                let _ = respond_to.send(result);
            }

            SignalingMessage::Client {
                connection_id,
                event,
            } => self.handle_client_event(connection_id, event),

            SignalingMessage::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }

            SignalingMessage::GateVerdict {
                room_id,
                ticket,
                result,
            } => self.handle_gate_verdict(&room_id, ticket, result),

            SignalingMessage::ListRooms { respond_to } => {
                let mut rooms: Vec<RoomSnapshot> = self
                    .rooms
                    .room_ids()
                    .filter_map(|room_id| self.snapshot_room(room_id))
                    .collect();
                rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
                let _ = respond_to.send(rooms);
            }

            SignalingMessage::GetRoom {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.snapshot_room(&room_id));
            }

            SignalingMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(RelayStatus {
                    connections: self.identities.len(),
                    rooms: self.rooms.room_count(),
                    pending_admissions: self.admissions.values().map(AdmissionQueue::len).sum(),
                    messages_processed: self.mailbox.messages_processed(),
                });
            }
        }
    }

    fn relay(&self) -> SignalingRelay<'_> {
        SignalingRelay::new(&self.identities, &self.rooms)
    }

    fn handle_connect(&mut self, handle: ConnectionHandle) -> Result<Identity, SignalingError> {
        let connection_id = handle.connection_id();
        let identity = self.identities.assign(handle.clone())?;

        handle.deliver(ServerEvent::Connected {
            identity: identity.clone(),
        });
        metrics::set_connections_active(self.identities.len());

        info!(
            target: "sg.actor",
            connection_id = %connection_id,
            identity = %identity,
            "Connection registered"
        );
        Ok(identity)
    }

    fn handle_client_event(&mut self, connection_id: ConnectionId, event: ClientEvent) {
        let Some(identity) = self.identities.identity_of(connection_id).cloned() else {
            debug!(
                target: "sg.actor",
                connection_id = %connection_id,
                "Event from unregistered connection ignored"
            );
            return;
        };

        match event {
            ClientEvent::JoinRoom(request) => self.handle_join(identity, request),
            ClientEvent::Offer(request) => self.handle_relay(RelayKind::Offer, &identity, request),
            ClientEvent::Answer(request) => {
                self.handle_relay(RelayKind::Answer, &identity, request);
            }
            ClientEvent::IceCandidate(request) => {
                self.handle_relay(RelayKind::IceCandidate, &identity, request);
            }
            ClientEvent::ChatMessage(request) => self.handle_chat(&identity, request),
            ClientEvent::EndCall => self.handle_end_call(&identity),
            ClientEvent::LeaveRoom => {
                if !self.leave_current_room(&identity) {
                    debug!(
                        target: "sg.actor",
                        identity = %identity,
                        "leave-room outside a room ignored"
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Join
    // ------------------------------------------------------------------

    fn handle_join(&mut self, identity: Identity, request: JoinRoomRequest) {
        if self.rooms.room_of(&identity).is_some() {
            self.reject(
                &identity,
                &SignalingError::InvalidRequest("already in a room".to_string()),
            );
            return;
        }
        if self.admissions.values().any(|queue| queue.holds(&identity)) {
            self.reject(
                &identity,
                &SignalingError::InvalidRequest("join already in progress".to_string()),
            );
            return;
        }

        let resolved = match self
            .rooms
            .resolve_room(request.room_id(), request.appointment_id())
        {
            Ok(resolved) => resolved,
            Err(e) => {
                self.reject(&identity, &e);
                return;
            }
        };

        self.next_ticket += 1;
        let room_id = resolved.room_id.clone();
        let pending = PendingJoin {
            ticket: self.next_ticket,
            resolved,
            draft: ParticipantDraft {
                identity,
                role: request.role,
                external_user_id: request.external_user_id,
            },
            credential: request.credential,
        };

        debug!(
            target: "sg.actor",
            room_id = %room_id,
            identity = %pending.draft.identity,
            ticket = pending.ticket,
            "Join queued"
        );

        self.admissions
            .entry(room_id.clone())
            .or_default()
            .waiting
            .push_back(pending);
        self.pump_admissions(&room_id);
    }

    /// Start the next admission for a room if none is in flight.
    ///
    /// Removes the queue, and releases an unused appointment binding, once the
    /// queue is drained.
    fn pump_admissions(&mut self, room_id: &RoomId) {
        loop {
            let next = {
                let Some(queue) = self.admissions.get_mut(room_id) else {
                    return;
                };
                if queue.in_flight.is_some() {
                    return;
                }
                queue.waiting.pop_front()
            };

            let Some(pending) = next else {
                self.admissions.remove(room_id);
                self.rooms.release_binding(room_id);
                return;
            };

            if !self.identities.is_live(&pending.draft.identity) {
                debug!(
                    target: "sg.actor",
                    room_id = %room_id,
                    ticket = pending.ticket,
                    "Joiner gone before admission"
                );
                metrics::record_join("abandoned");
                continue;
            }

            match self.gate.as_ref().map(Arc::clone) {
                Some(gate) => {
                    self.spawn_gate_check(gate, &pending);
                    if let Some(queue) = self.admissions.get_mut(room_id) {
                        queue.in_flight = Some(pending);
                    }
                    return;
                }
                None => self.complete_admission(pending, Ok(GateVerdict::allow(None))),
            }
        }
    }

    fn spawn_gate_check(&self, gate: Arc<dyn AuthorizationGate>, pending: &PendingJoin) {
        let sender = self.self_sender.clone();
        let mailbox = Arc::clone(&self.mailbox);
        let cancel_token = self.cancel_token.child_token();
        let timeout = self.gate_timeout;
        let room_id = pending.resolved.room_id.clone();
        let room_ref = pending.resolved.gate_reference().to_string();
        let credential = pending.credential.clone();
        let ticket = pending.ticket;

        tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::select! {
                () = cancel_token.cancelled() => return,
                result = tokio::time::timeout(timeout, gate.check(&room_ref, credential.as_ref())) => {
                    result.unwrap_or(Err(AuthGateError::Timeout))
                }
            };

            let outcome = match &result {
                Ok(verdict) if verdict.allowed => "allowed",
                Ok(_) => "denied",
                Err(e) => e.outcome(),
            };
            metrics::record_auth_gate_check(outcome, started.elapsed());

            let Some(sender) = sender.upgrade() else {
                return;
            };
            mailbox.record_enqueue();
            if sender
                .send(SignalingMessage::GateVerdict {
                    room_id,
                    ticket,
                    result,
                })
                .await
                .is_err()
            {
                mailbox.record_rollback();
            }
        });
    }

    fn handle_gate_verdict(
        &mut self,
        room_id: &RoomId,
        ticket: u64,
        result: Result<GateVerdict, AuthGateError>,
    ) {
        let pending = match self.admissions.get_mut(room_id) {
            Some(queue) if queue.in_flight.as_ref().is_some_and(|p| p.ticket == ticket) => {
                queue.in_flight.take()
            }
            _ => None,
        };
        let Some(pending) = pending else {
            warn!(
                target: "sg.actor",
                room_id = %room_id,
                ticket = ticket,
                "Stale gate verdict ignored"
            );
            return;
        };

        self.complete_admission(pending, result);
        self.pump_admissions(room_id);
    }

    fn complete_admission(
        &mut self,
        pending: PendingJoin,
        verdict: Result<GateVerdict, AuthGateError>,
    ) {
        let PendingJoin {
            resolved,
            mut draft,
            ..
        } = pending;
        let identity = draft.identity.clone();
        let room_id = resolved.room_id.clone();

        if !self.identities.is_live(&identity) {
            debug!(
                target: "sg.actor",
                room_id = %room_id,
                "Joiner disconnected during gate check"
            );
            metrics::record_join("abandoned");
            return;
        }

        match verdict {
            Ok(verdict) if verdict.allowed => {
                if verdict.role.is_some() {
                    draft.role = verdict.role;
                }
            }
            Ok(_) => {
                self.reject(
                    &identity,
                    &SignalingError::JoinDenied("gate refused".to_string()),
                );
                return;
            }
            Err(e) => {
                warn!(
                    target: "sg.gate",
                    room_id = %room_id,
                    error = %e,
                    "Gate check failed, denying join"
                );
                self.reject(&identity, &e.into());
                return;
            }
        }

        self.reconcile_room(&room_id);

        let now = Utc::now();
        let admission = self.rooms.admit(&resolved, draft.clone(), now);
        let Admission::Accepted { peers, created } = admission else {
            self.reject(&identity, &SignalingError::RoomFull);
            return;
        };

        let started_at = self.lifecycle.start(&room_id, now);
        let relay = self.relay();

        relay.send_to(
            &identity,
            ServerEvent::JoinedRoom {
                room_id: room_id.to_string(),
                identity: identity.clone(),
                peers: peers.clone(),
                call_started_at: started_at.timestamp_millis(),
            },
        );

        match peers.first() {
            None => {
                relay.send_to(&identity, ServerEvent::Waiting);
            }
            Some(peer) => {
                relay.send_to(
                    &identity,
                    ServerEvent::Ready {
                        peer_identity: peer.identity.clone(),
                    },
                );
                relay.notify_others(
                    &room_id,
                    &identity,
                    &ServerEvent::PeerJoined {
                        identity: identity.clone(),
                        role: draft.role.clone(),
                        external_user_id: draft.external_user_id.clone(),
                    },
                );
                relay.notify_others(
                    &room_id,
                    &identity,
                    &ServerEvent::Ready {
                        peer_identity: identity.clone(),
                    },
                );
            }
        }

        info!(
            target: "sg.actor",
            room_id = %room_id,
            identity = %identity,
            role = ?draft.role,
            created = created,
            participants = peers.len() + 1,
            "Join accepted"
        );
        metrics::record_join("accepted");
        metrics::set_rooms_active(self.rooms.room_count());
    }

    /// Drop participants whose connections died without a processed disconnect.
    fn reconcile_room(&mut self, room_id: &RoomId) {
        let identities = &self.identities;
        let reconciliation = self.rooms.reconcile(room_id, |id| identities.is_live(id));

        let relay = self.relay();
        let members = self.rooms.members(room_id);
        for evicted in &reconciliation.evicted {
            relay.notify(
                members.iter(),
                &ServerEvent::PeerLeft {
                    identity: evicted.clone(),
                },
            );
        }

        if reconciliation.room_removed {
            self.lifecycle.clear(room_id);
            metrics::record_call_ended("room_emptied");
        }
    }

    fn reject(&self, identity: &Identity, error: &SignalingError) {
        if let Some(event) = error.outbound_event() {
            self.relay().send_to(identity, event);
        }
        info!(
            target: "sg.actor",
            identity = %identity,
            error = %error,
            "Join rejected"
        );
        metrics::record_join(error.join_outcome());
    }

    // ------------------------------------------------------------------
    // Relay and chat
    // ------------------------------------------------------------------

    fn handle_relay(&self, kind: RelayKind, sender: &Identity, request: RelayRequest) {
        if let Err(e) = self
            .relay()
            .relay(kind, sender, &request.target, request.payload)
        {
            debug!(
                target: "sg.relay",
                kind = kind.as_str(),
                error = %e,
                "Relay dropped"
            );
        }
    }

    fn handle_chat(&self, sender: &Identity, request: ChatRequest) {
        let reached = self.relay().broadcast_chat(
            sender,
            ChatMessage {
                room_id: request.room_id.as_deref(),
                message: request.message.as_deref(),
                meta: request.meta,
                timestamp: Utc::now().timestamp_millis(),
            },
        );
        debug!(target: "sg.relay", reached = reached, "Chat broadcast");
    }

    // ------------------------------------------------------------------
    // Leave, end and disconnect
    // ------------------------------------------------------------------

    fn handle_end_call(&mut self, identity: &Identity) {
        let Some(room_id) = self.rooms.room_of(identity).cloned() else {
            debug!(
                target: "sg.actor",
                identity = %identity,
                "end-call outside a room ignored"
            );
            return;
        };

        if let Some(ended) = self
            .lifecycle
            .end_call(&room_id, &mut self.rooms, &self.identities)
        {
            let duration_secs = ended
                .started_at
                .map(|start| (Utc::now() - start).num_seconds());
            info!(
                target: "sg.actor",
                room_id = %ended.room_id,
                ended_by = %identity,
                notified = ended.notified,
                duration_secs = ?duration_secs,
                "Call ended"
            );
        }
        self.release_idle_binding(&room_id);
        metrics::set_rooms_active(self.rooms.room_count());
    }

    /// Remove an identity from its room, notifying the remaining participant.
    ///
    /// Returns `false` if the identity was not in a room.
    fn leave_current_room(&mut self, identity: &Identity) -> bool {
        let Some(departure) = self.rooms.remove_participant(identity) else {
            return false;
        };

        self.relay().notify(
            departure.remaining.iter(),
            &ServerEvent::PeerLeft {
                identity: identity.clone(),
            },
        );

        if departure.room_removed {
            self.lifecycle.clear(&departure.room_id);
            self.release_idle_binding(&departure.room_id);
            metrics::record_call_ended("room_emptied");
        }

        info!(
            target: "sg.actor",
            room_id = %departure.room_id,
            identity = %identity,
            room_removed = departure.room_removed,
            "Participant left"
        );
        metrics::set_rooms_active(self.rooms.room_count());
        true
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let Some(identity) = self.identities.revoke(connection_id) else {
            debug!(
                target: "sg.actor",
                connection_id = %connection_id,
                "Disconnect for unknown connection ignored"
            );
            return;
        };

        // Queued joins are dropped; an in-flight one is discarded when its
        // verdict finds the joiner gone.
        let mut drained = Vec::new();
        for (room_id, queue) in &mut self.admissions {
            let before = queue.waiting.len();
            queue.waiting.retain(|p| p.draft.identity != identity);
            let dropped = before - queue.waiting.len();
            if dropped > 0 {
                drained.push(room_id.clone());
                for _ in 0..dropped {
                    metrics::record_join("abandoned");
                }
            }
        }
        for room_id in &drained {
            self.pump_admissions(room_id);
        }

        self.leave_current_room(&identity);
        metrics::set_connections_active(self.identities.len());

        info!(
            target: "sg.actor",
            connection_id = %connection_id,
            identity = %identity,
            "Connection closed"
        );
    }

    /// Drop the binding of a destroyed room unless a join for it is queued.
    fn release_idle_binding(&mut self, room_id: &RoomId) {
        if !self.admissions.contains_key(room_id) {
            self.rooms.release_binding(room_id);
        }
    }

    fn snapshot_room(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let participants = self.rooms.participants(room_id)?;
        Some(RoomSnapshot {
            room_id: room_id.to_string(),
            appointment_id: self.rooms.room_appointment(room_id).map(str::to_string),
            call_started_at: self
                .lifecycle
                .started_at(room_id)
                .map(|t| t.timestamp_millis()),
            participants: participants
                .iter()
                .map(|p| ParticipantSnapshot {
                    identity: p.identity.to_string(),
                    role: p.role.clone(),
                    external_user_id: p.external_user_id.clone(),
                    joined_at: p.joined_at.timestamp_millis(),
                })
                .collect(),
        })
    }

    fn shutdown(&mut self) {
        for handle in self.identities.handles() {
            handle.close();
        }
        info!(
            target: "sg.actor",
            instance_id = %self.instance_id,
            connections = self.identities.len(),
            rooms = self.rooms.room_count(),
            "Closed all connections"
        );
    }
}
