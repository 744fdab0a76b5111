//! Mock Authorization Gate.
//!
//! Serves `GET /appointments/{ref}/can-join` from a wiremock server so tests
//! can exercise the real HTTP gate client.
//!
//! # Example
//!
//! ```rust,ignore
//! let gate = MockAuthGate::start().await;
//! gate.allow("appt-1", Some("host")).await;
//! gate.deny("appt-2").await;
//! gate.fail("appt-3", 503).await;
//! ```

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// wiremock-backed Authorization Gate.
pub struct MockAuthGate {
    server: MockServer,
}

impl MockAuthGate {
    /// Start a gate with no rules; unmatched references get 404 and deny.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to configure as `AUTH_GATE_URL`.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    fn can_join_path(room_ref: &str) -> String {
        format!("/appointments/{room_ref}/can-join")
    }

    /// Allow joins to `room_ref`, optionally assigning `role`.
    pub async fn allow(&self, room_ref: &str, role: Option<&str>) {
        Mock::given(method("GET"))
            .and(path(Self::can_join_path(room_ref)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"allowed": true, "role": role})),
            )
            .mount(&self.server)
            .await;
    }

    /// Allow joins to `room_ref` only for `credential`.
    pub async fn allow_credential(&self, room_ref: &str, credential: &str, role: Option<&str>) {
        Mock::given(method("GET"))
            .and(path(Self::can_join_path(room_ref)))
            .and(header("authorization", format!("Bearer {credential}").as_str()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"allowed": true, "role": role})),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer `{"allowed": false}` for `room_ref`.
    pub async fn deny(&self, room_ref: &str) {
        Mock::given(method("GET"))
            .and(path(Self::can_join_path(room_ref)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"allowed": false})))
            .mount(&self.server)
            .await;
    }

    /// Answer `status` with an empty body for `room_ref`.
    pub async fn fail(&self, room_ref: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(Self::can_join_path(room_ref)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Allow `room_ref`, but only after `delay`.
    pub async fn allow_after(&self, room_ref: &str, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(Self::can_join_path(room_ref)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"allowed": true}))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Number of gate requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    /// `Authorization` header values of received requests, in order.
    pub async fn received_authorizations(&self) -> Vec<Option<String>> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| {
                request
                    .headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }
}
