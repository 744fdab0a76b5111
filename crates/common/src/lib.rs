//! Common types shared across the signaling relay crates.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes (identity, connection, room)
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
