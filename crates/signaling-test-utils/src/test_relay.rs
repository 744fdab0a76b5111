//! Test harness for end-to-end relay tests.
//!
//! Provides `TestRelay` for spawning a real relay (WebSocket, health and room
//! inspection on one listener) and `WsTestClient` for talking to it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use signaling_service::actors::SignalingActorHandle;
use signaling_service::config::{DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_OUTBOUND_BUFFER};
use signaling_service::gate::{AuthorizationGate, HttpAuthorizationGate};
use signaling_service::observability::{health_router, rooms_router, HealthState};
use signaling_service::transport::{ws_router, WsSettings};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::EVENT_TIMEOUT;

/// Gate timeout used by the harness.
pub const TEST_GATE_TIMEOUT: Duration = Duration::from_millis(500);

/// A running relay bound to a random local port.
///
/// # Example
/// ```rust,ignore
/// let relay = TestRelay::spawn(None).await?;
/// let mut client = relay.ws_client().await?;
/// assert_eq!(client.next_json().await["event"], "connected");
/// ```
pub struct TestRelay {
    addr: SocketAddr,
    actor: SignalingActorHandle,
    _handle: JoinHandle<()>,
}

impl TestRelay {
    /// Spawn a relay, optionally gated by the HTTP gate at `gate_url`.
    pub async fn spawn(gate_url: Option<String>) -> Result<Self, anyhow::Error> {
        Self::spawn_with(gate_url, DEFAULT_MAX_MESSAGE_BYTES).await
    }

    /// Spawn a relay with a custom inbound message limit.
    pub async fn spawn_with(
        gate_url: Option<String>,
        max_message_bytes: usize,
    ) -> Result<Self, anyhow::Error> {
        let gate: Option<Arc<dyn AuthorizationGate>> = match gate_url {
            Some(url) => Some(Arc::new(
                HttpAuthorizationGate::new(&url, TEST_GATE_TIMEOUT)
                    .map_err(|e| anyhow::anyhow!("Failed to build gate: {}", e))?,
            )),
            None => None,
        };

        let actor = SignalingActorHandle::new("sg-test".to_string(), gate, TEST_GATE_TIMEOUT);
        let health = Arc::new(HealthState::new());

        let app = ws_router(
            actor.clone(),
            WsSettings {
                outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
                max_message_bytes,
            },
        )
        .merge(health_router(Arc::clone(&health)))
        .merge(rooms_router(actor.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test relay: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test relay error: {}", e);
            }
        });
        health.set_ready();

        Ok(Self {
            addr,
            actor,
            _handle: handle,
        })
    }

    /// WebSocket URL of the signaling endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Actor handle, for inspection queries.
    pub fn actor(&self) -> &SignalingActorHandle {
        &self.actor
    }

    /// Open a WebSocket to the relay.
    pub async fn ws_client(&self) -> Result<WsTestClient, anyhow::Error> {
        let (stream, _) = tokio_tungstenite::connect_async(self.ws_url())
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket connect failed: {}", e))?;
        Ok(WsTestClient { stream })
    }

    /// Open a WebSocket and consume `connected`, returning the identity.
    pub async fn connected_client(&self) -> Result<(WsTestClient, String), anyhow::Error> {
        let mut client = self.ws_client().await?;
        let connected = client.next_json().await;
        anyhow::ensure!(
            connected["event"] == "connected",
            "expected connected, got {connected}"
        );
        let identity = connected["identity"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("connected without identity"))?
            .to_string();
        Ok((client, identity))
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.actor.cancel();
        self._handle.abort();
    }
}

/// JSON-over-WebSocket test client.
pub struct WsTestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTestClient {
    /// Send a JSON value as a text frame.
    pub async fn send_json(&mut self, value: Value) {
        self.send_text(value.to_string()).await;
    }

    pub async fn send_text(&mut self, text: String) {
        self.stream
            .send(Message::Text(text))
            .await
            .expect("send should succeed");
    }

    /// Next text frame parsed as JSON, skipping control frames.
    pub async fn next_json(&mut self) -> Value {
        loop {
            let message = tokio::time::timeout(EVENT_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for frame")
                .expect("socket closed")
                .expect("socket error");
            match message {
                Message::Text(text) => {
                    return serde_json::from_str(&text).expect("frame should be JSON");
                }
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    /// Next frame's `event` tag.
    pub async fn next_event_name(&mut self) -> String {
        let value = self.next_json().await;
        value["event"]
            .as_str()
            .unwrap_or_else(|| panic!("frame without event: {value}"))
            .to_string()
    }

    /// Wait until the server closes the socket.
    pub async fn expect_closed(&mut self) {
        loop {
            let next = tokio::time::timeout(EVENT_TIMEOUT, self.stream.next())
                .await
                .expect("socket was not closed");
            match next {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    }

    /// Close the socket from the client side.
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
