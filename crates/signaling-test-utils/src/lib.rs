//! # Signaling Test Utilities
//!
//! Shared test utilities for the signaling relay.
//!
//! ## Modules
//!
//! - `mock_gate` - wiremock-backed Authorization Gate
//! - `test_client` - In-process client driving the signaling actor directly
//! - `test_relay` - Real relay bound to `127.0.0.1:0` with a WebSocket client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signaling_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let gate = MockAuthGate::start().await;
//!     gate.allow("appt-1", Some("host")).await;
//!
//!     let relay = TestRelay::spawn(Some(gate.url())).await.unwrap();
//!     let mut alice = relay.ws_client().await.unwrap();
//!     alice.send_json(serde_json::json!({"event": "join-room", "appointmentId": "appt-1"})).await;
//!     assert_eq!(alice.next_json().await["event"], "joined-room");
//! }
//! ```

pub mod mock_gate;
pub mod test_client;
pub mod test_relay;

pub use mock_gate::MockAuthGate;
pub use test_client::TestClient;
pub use test_relay::{TestRelay, WsTestClient};

use std::time::Duration;

/// How long helpers wait for an expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);
