//! `ConnectionHandle` - the core's borrowed reference to one transport connection.
//!
//! Each handle:
//! - Is minted by the transport when a socket is accepted
//! - Carries a bounded outbound queue drained by the transport's writer task
//! - Carries a cancellation token (child of the service root token)
//!
//! # Delivery
//!
//! Delivery never awaits. The signaling actor serves every room, so a slow
//! client must not stall it: when the outbound queue is full the event is
//! dropped and counted.
//!
//! # Liveness
//!
//! A connection is live while its outbound queue is open and its token is not
//! cancelled. The writer task drops the receiver when the socket closes, which
//! makes the handle report not-live before the disconnect event is processed.

use crate::observability::metrics;
use crate::protocol::ServerEvent;

use common::types::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a transport connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    connection_id: ConnectionId,
    outbound: mpsc::Sender<ServerEvent>,
    cancel_token: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    ///
    /// The transport drains the receiver into the socket and drops it when the
    /// socket closes.
    #[must_use]
    pub fn channel(
        connection_id: ConnectionId,
        buffer: usize,
        cancel_token: CancellationToken,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (outbound, receiver) = mpsc::channel(buffer.max(1));
        (
            Self {
                connection_id,
                outbound,
                cancel_token,
            },
            receiver,
        )
    }

    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue an event for the client.
    ///
    /// Returns `false` if the event was dropped (queue full or connection gone).
    pub fn deliver(&self, event: ServerEvent) -> bool {
        let name = event.name();
        match self.outbound.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    target: "sg.connection",
                    connection_id = %self.connection_id,
                    event = name,
                    "Outbound queue full, dropping event"
                );
                metrics::record_message_dropped("outbound_full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    target: "sg.connection",
                    connection_id = %self.connection_id,
                    event = name,
                    "Connection closed, dropping event"
                );
                metrics::record_message_dropped("connection_closed");
                false
            }
        }
    }

    /// Whether the underlying connection is still live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.outbound.is_closed() && !self.cancel_token.is_cancelled()
    }

    /// Close the connection.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    /// Token the transport watches for server-initiated close.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}
