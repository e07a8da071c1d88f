//! Client Connection Capability
//!
//! The handler never touches a socket. A connection is exactly two
//! capabilities: "is it still open" and "queue bytes to it", plus an id so
//! a seat can tell whether a closing connection is the one that holds it.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Minimal capability the handler needs from a client connection
pub trait ClientConnection: Send + Sync {
    /// Stable id for this connection
    fn id(&self) -> Uuid;

    /// Whether the connection can still accept messages
    fn is_open(&self) -> bool;

    /// Queue a payload for delivery; best-effort, never blocks
    fn send(&self, payload: String);

    /// Serialize and queue a protocol message
    fn send_message(&self, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(payload) => self.send(payload),
            Err(e) => tracing::error!("Failed to encode server message: {}", e),
        }
    }
}

/// Connection backed by an unbounded outbound queue. The transport drains
/// the receiver into the socket; tests read replies straight off it.
pub struct ChannelConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelConnection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = std::sync::Arc::new(Self {
            id: Uuid::new_v4(),
            tx,
        });
        (conn, rx)
    }
}

impl ClientConnection for ChannelConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, payload: String) {
        // The receiver dropping means the writer is gone; nothing to do
        let _ = self.tx.send(payload);
    }
}
