//! Actor model for the signaling relay.
//!
//! ```text
//! SignalingActor (singleton)
//! ├── owns IdentityRegistry, RoomManager, CallLifecycle
//! ├── spawns one gate-check task per admission in flight
//! └── holds a ConnectionHandle per WebSocket
//!     └── writer task drains the handle's outbound queue into the socket
//! ```
//!
//! # Modules
//!
//! - [`signaling`] - `SignalingActor` and its handle
//! - [`connection`] - `ConnectionHandle`, the actor's view of one socket
//! - [`messages`] - Message and snapshot types
//! - [`metrics`] - Mailbox monitoring

pub mod connection;
pub mod messages;
pub mod metrics;
pub mod signaling;

pub use connection::ConnectionHandle;
pub use messages::*;
pub use metrics::MailboxMonitor;
pub use signaling::{SignalingActor, SignalingActorHandle};
