//! Authorization Gate client.
//!
//! Before a join is admitted the relay asks an external scheduling service
//! whether the presented credential may enter the referenced appointment or
//! room:
//!
//! ```text
//! GET {AUTH_GATE_URL}/appointments/{roomRef}/can-join
//! Authorization: Bearer {credential}
//!
//! 200 {"allowed": true, "role": "host"}
//! ```
//!
//! Every failure (transport error, non-2xx status, unparseable body, timeout)
//! is a denial. The credential is never logged.

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Default TCP connect timeout for the gate client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Gate verdict for one join.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GateVerdict {
    /// Whether the join may proceed.
    pub allowed: bool,
    /// Role assigned by the gate, overriding the client's request.
    #[serde(default)]
    pub role: Option<String>,
}

impl GateVerdict {
    /// Allow with an optional role.
    #[must_use]
    pub fn allow(role: Option<&str>) -> Self {
        Self {
            allowed: true,
            role: role.map(str::to_string),
        }
    }

    /// Deny.
    #[must_use]
    pub fn deny() -> Self {
        Self {
            allowed: false,
            role: None,
        }
    }
}

/// Authorization Gate failures. All of them deny the join.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthGateError {
    /// Request could not be sent or completed.
    #[error("gate request failed: {0}")]
    Http(String),

    /// Gate answered with a non-success status.
    #[error("gate returned status {0}")]
    Status(u16),

    /// Gate answered 2xx with an unparseable body.
    #[error("gate returned an invalid response: {0}")]
    InvalidResponse(String),

    /// No verdict within the configured timeout.
    #[error("gate check timed out")]
    Timeout,

    /// Client could not be constructed.
    #[error("gate misconfigured: {0}")]
    Configuration(String),
}

impl AuthGateError {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            AuthGateError::Timeout => "timeout",
            AuthGateError::Http(_)
            | AuthGateError::Status(_)
            | AuthGateError::InvalidResponse(_)
            | AuthGateError::Configuration(_) => "error",
        }
    }
}

/// Join authorization seam.
#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    /// Ask whether `credential` may join `room_ref`.
    async fn check(
        &self,
        room_ref: &str,
        credential: Option<&SecretString>,
    ) -> Result<GateVerdict, AuthGateError>;
}

/// HTTP implementation of [`AuthorizationGate`].
#[derive(Debug, Clone)]
pub struct HttpAuthorizationGate {
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpAuthorizationGate {
    /// Create a gate client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AuthGateError::Configuration` if the URL cannot be a base URL
    /// or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthGateError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AuthGateError::Configuration(format!("invalid gate URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AuthGateError::Configuration(
                "gate URL cannot be a base".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| {
                AuthGateError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// URL of the `can-join` check for `room_ref`, with the reference
    /// percent-encoded as a single path segment.
    fn can_join_url(&self, room_ref: &str) -> Result<Url, AuthGateError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AuthGateError::Configuration("gate URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["appointments", room_ref, "can-join"]);
        Ok(url)
    }
}

#[async_trait]
impl AuthorizationGate for HttpAuthorizationGate {
    #[instrument(skip_all, name = "sg.gate.check")]
    async fn check(
        &self,
        room_ref: &str,
        credential: Option<&SecretString>,
    ) -> Result<GateVerdict, AuthGateError> {
        let url = self.can_join_url(room_ref)?;

        let mut request = self.http_client.get(url);
        if let Some(credential) = credential {
            request = request.bearer_auth(credential.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AuthGateError::Timeout
            } else {
                debug!(target: "sg.gate", error = %e, "Gate request failed");
                AuthGateError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "sg.gate",
                status = %status,
                "Gate rejected the check"
            );
            return Err(AuthGateError::Status(status.as_u16()));
        }

        let verdict: GateVerdict = response.json().await.map_err(|e| {
            warn!(target: "sg.gate", error = %e, "Failed to parse gate response");
            AuthGateError::InvalidResponse(e.to_string())
        })?;

        debug!(
            target: "sg.gate",
            allowed = verdict.allowed,
            role = ?verdict.role,
            "Gate verdict received"
        );
        Ok(verdict)
    }
}

/// In-process gate doubles for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Scripted [`AuthorizationGate`].
    ///
    /// A held gate waits for [`MockGate::release`] before answering each
    /// check, which lets tests interleave events with an in-flight check.
    pub struct MockGate {
        result: Result<GateVerdict, AuthGateError>,
        hold: Option<Arc<Semaphore>>,
        delay: Option<Duration>,
        call_count: AtomicUsize,
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl MockGate {
        fn with_result(result: Result<GateVerdict, AuthGateError>) -> Self {
            Self {
                result,
                hold: None,
                delay: None,
                call_count: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        /// Gate that allows every join without assigning a role.
        #[must_use]
        pub fn allowing() -> Self {
            Self::with_result(Ok(GateVerdict::allow(None)))
        }

        /// Gate that allows every join and assigns `role`.
        #[must_use]
        pub fn allowing_with_role(role: &str) -> Self {
            Self::with_result(Ok(GateVerdict::allow(Some(role))))
        }

        /// Gate that denies every join.
        #[must_use]
        pub fn denying() -> Self {
            Self::with_result(Ok(GateVerdict::deny()))
        }

        /// Gate that fails every check with `error`.
        #[must_use]
        pub fn failing(error: AuthGateError) -> Self {
            Self::with_result(Err(error))
        }

        /// Hold each check until released.
        #[must_use]
        pub fn held(mut self) -> Self {
            self.hold = Some(Arc::new(Semaphore::new(0)));
            self
        }

        /// Sleep before answering each check.
        #[must_use]
        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Let `count` held checks complete.
        pub fn release(&self, count: usize) {
            if let Some(hold) = &self.hold {
                hold.add_permits(count);
            }
        }

        /// Number of checks started.
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Room references and credentials seen, in call order.
        #[must_use]
        pub fn seen(&self) -> Vec<(String, Option<String>)> {
            self.seen
                .lock()
                .map(|seen| seen.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl AuthorizationGate for MockGate {
        async fn check(
            &self,
            room_ref: &str,
            credential: Option<&SecretString>,
        ) -> Result<GateVerdict, AuthGateError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push((
                    room_ref.to_string(),
                    credential.map(|c| c.expose_secret().to_string()),
                ));
            }

            if let Some(hold) = &self.hold {
                if let Ok(permit) = hold.acquire().await {
                    permit.forget();
                }
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.result.clone()
        }
    }
}
