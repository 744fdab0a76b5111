//! Signaling relay service library.
//!
//! A signaling relay for two-party peer-to-peer calls. Clients connect over a
//! WebSocket, receive a connection-scoped identity, join a room of at most two
//! participants (optionally authorized by an external gate), and exchange
//! session descriptions, network-path candidates and chat messages through
//! the relay. Media never flows through it.
//!
//! # Architecture
//!
//! ```text
//! WebSocket (transport::ws) ──ClientEvent──▶ SignalingActor
//!        ▲                                    ├── IdentityRegistry
//!        └──── ServerEvent ◀── ConnectionHandle├── RoomManager
//!                                             ├── CallLifecycle
//!                                             └── AuthorizationGate (spawned checks)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - The signaling actor, connection handles and messages
//! - [`identity`] - Identity Registry
//! - [`rooms`] - Room Manager and appointment bindings
//! - [`lifecycle`] - Call start times and `end-call`
//! - [`relay`] - Addressed forwarding and chat fan-out
//! - [`gate`] - Authorization Gate client
//! - [`protocol`] - Wire events
//! - [`transport`] - WebSocket binding
//! - [`observability`] - Health, inspection and metrics
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types

pub mod actors;
pub mod config;
pub mod errors;
pub mod gate;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod relay;
pub mod rooms;
pub mod transport;
