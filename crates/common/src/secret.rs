//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for join credentials. A credential
//! arrives from the client inside a `join-room` event and is forwarded to the
//! Authorization Gate as a bearer token; it must never reach a log line.
//!
//! `SecretString` implements `Debug` with redaction, so any struct deriving
//! `Debug` that holds one is safe to pass to `tracing` with `?field`.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct JoinPayload {
//!     room_id: String,
//!     credential: Option<SecretString>,
//! }
//!
//! let json = r#"{"room_id": "r1", "credential": "bearer-value"}"#;
//! let payload: JoinPayload = serde_json::from_str(json).unwrap();
//!
//! // Debug output redacts the credential
//! assert!(!format!("{payload:?}").contains("bearer-value"));
//!
//! // Only an explicit call exposes it
//! let raw: &str = payload.credential.as_ref().unwrap().expose_secret();
//! assert_eq!(raw, "bearer-value");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
