//! TCP Transport
//!
//! Line-delimited JSON over TCP. Each accepted socket gets its own task:
//! inbound lines are fed to the protocol handler, outbound messages drain
//! from the connection's queue into the write half.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::error::Result;
use crate::server::connection::ChannelConnection;
use crate::server::handler::{ConnectionState, SessionServer};

/// Longest accepted client line; anything bigger is a protocol violation
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// TCP front end for the session protocol
pub struct GameServer {
    /// Bind address
    bind_address: String,
    /// Shared protocol handler
    handler: Arc<SessionServer>,
    /// Shutdown signal
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl GameServer {
    /// Create a new game server
    pub fn new(bind_address: String, handler: Arc<SessionServer>) -> Self {
        let (shutdown_tx, _) = tokio::sync::watch::channel(false);

        Self {
            bind_address,
            handler,
            shutdown: shutdown_tx,
        }
    }

    /// Bind and serve until stopped
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        tracing::info!("Game server listening on {}", self.bind_address);
        self.serve(listener).await
    }

    /// Accept connections on an already-bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                tracing::debug!("Accepted connection from {}", addr);
                                handle_connection(socket, handler).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Game server stopped");
        Ok(())
    }

    /// Stop the server
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Drive one client socket until it closes, then release whatever it held
async fn handle_connection(socket: TcpStream, handler: Arc<SessionServer>) {
    let (reader, writer) = socket.into_split();
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    let (conn, mut outbound) = ChannelConnection::new();
    let mut state = ConnectionState::new(conn);

    // Outbound messages come from any task holding the connection handle,
    // so a dedicated task owns the write half
    let writer_task = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if sink.send(payload).await.is_err() {
                break;
            }
        }
    });

    while let Some(line) = lines.next().await {
        match line {
            Ok(raw) => handler.handle_message(&mut state, &raw).await,
            Err(e) => {
                tracing::warn!("Dropping connection {}: {}", state.conn.id(), e);
                break;
            }
        }
    }

    handler.handle_close(&state).await;
    writer_task.abort();
    tracing::debug!("Connection {} closed", state.conn.id());
}
