//! WebSocket transport at `GET /ws`.
//!
//! Each accepted socket gets:
//!
//! - a `ConnectionId` and a `ConnectionHandle` registered with the actor
//! - a writer task draining the handle's outbound queue into the socket
//! - a reader loop parsing text frames into `ClientEvent`s
//!
//! When the reader stops (client close, socket error, or server shutdown) the
//! connection token is cancelled, the writer exits and drops the outbound
//! receiver, and only then is the disconnect reported to the actor.

use crate::actors::{ConnectionHandle, SignalingActorHandle};
use crate::observability::metrics;
use crate::protocol::{ClientEvent, ServerEvent};

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use common::types::ConnectionId;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Per-socket transport limits.
#[derive(Debug, Clone, Copy)]
pub struct WsSettings {
    /// Outbound queue depth per connection.
    pub outbound_buffer: usize,
    /// Largest accepted inbound message in bytes.
    pub max_message_bytes: usize,
}

#[derive(Clone)]
struct WsState {
    actor: SignalingActorHandle,
    settings: WsSettings,
}

/// Router serving the signaling WebSocket at `/ws`.
pub fn ws_router(actor: SignalingActorHandle, settings: WsSettings) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(WsState { actor, settings })
}

async fn ws_upgrade(State(state): State<WsState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let connection_id = ConnectionId::new();
    ws.max_message_size(state.settings.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(state, connection_id, socket))
}

#[instrument(skip_all, name = "sg.ws.connection", fields(connection_id = %connection_id))]
async fn handle_socket(state: WsState, connection_id: ConnectionId, socket: WebSocket) {
    let cancel_token = state.actor.child_token();
    let (handle, outbound) =
        ConnectionHandle::channel(connection_id, state.settings.outbound_buffer, cancel_token.clone());
    let (mut sink, mut stream) = socket.split();

    let identity = match state.actor.connect(handle.clone()).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(target: "sg.ws", error = %e, "Connection registration failed");
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: "registration failed".into(),
                })))
                .await;
            return;
        }
    };
    info!(target: "sg.ws", identity = %identity, "WebSocket connected");

    let writer = tokio::spawn(write_outbound(sink, outbound, cancel_token.clone()));

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    dispatch_text(&state.actor, &handle, connection_id, &text).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    debug!(target: "sg.ws", len = bytes.len(), "Binary frame ignored");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(target: "sg.ws", error = %e, "WebSocket read failed");
                    break;
                }
            },
        }
    }

    cancel_token.cancel();
    if let Err(e) = writer.await {
        warn!(target: "sg.ws", error = %e, "Writer task failed");
    }

    if let Err(e) = state.actor.disconnect(connection_id).await {
        debug!(target: "sg.ws", error = %e, "Disconnect not delivered");
    }
    info!(target: "sg.ws", identity = %identity, "WebSocket disconnected");
}

async fn dispatch_text(
    actor: &SignalingActorHandle,
    handle: &ConnectionHandle,
    connection_id: ConnectionId,
    text: &str,
) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => {
            if let Err(e) = actor.dispatch(connection_id, event).await {
                debug!(target: "sg.ws", error = %e, "Event not delivered to actor");
            }
        }
        Err(e) => {
            debug!(target: "sg.ws", len = text.len(), error = %e, "Malformed frame");
            metrics::record_message_dropped("malformed");
            handle.deliver(ServerEvent::InvalidRequest {
                reason: "unrecognized or malformed event".to_string(),
            });
        }
    }
}

async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "connection closing".into(),
                    })))
                    .await;
                break;
            }

            event = outbound.recv() => {
                let Some(event) = event else {
                    break;
                };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(target: "sg.ws", event = event.name(), error = %e, "Event serialization failed");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }
    // Dropping `outbound` marks the handle not-live
}
