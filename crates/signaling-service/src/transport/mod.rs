//! Client transport.
//!
//! The relay core only sees [`crate::actors::ConnectionHandle`]s and parsed
//! [`crate::protocol::ClientEvent`]s; this module binds them to WebSockets.

pub mod ws;

pub use ws::{ws_router, WsSettings};
