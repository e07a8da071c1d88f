//! Session Protocol Handler
//!
//! Transport-independent dispatch for the join/move/close protocol. The
//! TCP transport feeds raw lines in; everything the handler knows about
//! the peer is behind [`ClientConnection`].
//!
//! Ordering rules the handlers preserve:
//! - a seat is claimed in the store before it is registered locally
//! - a move mutates only while the session mutex is held, and the
//!   snapshot is published before the mutex is released
//! - replies reflect post-transition state

use std::sync::Arc;

use crate::coord::lock::LockManager;
use crate::coord::replicator::Replicator;
use crate::game::board::Mark;
use crate::game::registry::SessionRegistry;
use crate::game::session::{GameStatus, MoveError};
use crate::protocol::{ClientMessage, LastMove, ServerMessage, SyncState};
use crate::server::connection::ClientConnection;

/// Per-connection protocol state, owned by the transport task
pub struct ConnectionState {
    /// The peer this state belongs to
    pub conn: Arc<dyn ClientConnection>,
    /// Game joined on this connection, if any
    pub game_id: Option<String>,
    /// Seat held on this connection, if any
    pub mark: Option<Mark>,
}

impl ConnectionState {
    /// Fresh state for a newly accepted connection
    pub fn new(conn: Arc<dyn ClientConnection>) -> Self {
        Self {
            conn,
            game_id: None,
            mark: None,
        }
    }
}

/// The protocol handler shared by every connection of one process
pub struct SessionServer {
    /// This process's id; stamped into snapshots as the origin
    server_id: String,
    registry: Arc<SessionRegistry>,
    locks: Arc<LockManager>,
    replicator: Arc<Replicator>,
    /// Game id used when a client sends none
    default_game_id: String,
}

impl SessionServer {
    /// Wire up a handler over the shared coordination pieces
    pub fn new(
        server_id: String,
        registry: Arc<SessionRegistry>,
        locks: Arc<LockManager>,
        replicator: Arc<Replicator>,
        default_game_id: String,
    ) -> Self {
        Self {
            server_id,
            registry,
            locks,
            replicator,
            default_game_id,
        }
    }

    /// The session registry this handler mutates
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Parse and dispatch one raw client line
    pub async fn handle_message(&self, state: &mut ConnectionState, raw: &str) {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => {
                send_error(&state.conn, "Invalid JSON");
                return;
            }
        };

        let msg: ClientMessage = match serde_json::from_value(value) {
            Ok(m) => m,
            Err(_) => {
                send_error(&state.conn, "Unknown message type");
                return;
            }
        };

        match msg {
            ClientMessage::Join { game_id, mark } => self.handle_join(state, game_id, mark).await,
            ClientMessage::Move { game_id, row, col } => {
                self.handle_move(state, game_id, row, col).await
            }
        }
    }

    /// Claim a seat and, when both seats are held somewhere in the
    /// cluster, start the game.
    pub async fn handle_join(&self, state: &mut ConnectionState, game_id: String, mark: String) {
        let game_id = self.resolve_game_id(game_id);

        let Some(mark) = Mark::parse(&mark) else {
            send_error(&state.conn, "mark must be X or O");
            return;
        };

        if !self.locks.acquire_seat(&game_id, mark).await {
            send_error(&state.conn, &format!("Mark {} is already taken", mark));
            return;
        }
        tracing::info!(
            "Connection {} joined game {} as {}",
            state.conn.id(),
            game_id,
            mark
        );

        let renewal = self.locks.start_seat_renewal(&game_id, mark);
        let conn = Arc::clone(&state.conn);
        self.registry
            .with_session(&game_id, |session| {
                session.register_connection(mark, conn);
                session.set_renewal(mark, renewal);
            })
            .await;
        state.game_id = Some(game_id.clone());
        state.mark = Some(mark);

        // The other seat may be held on a different process, so the
        // both-seats check goes through the store, not local state
        let seats_filled = self.locks.seat_exists(&game_id, Mark::X).await
            && self.locks.seat_exists(&game_id, Mark::O).await;

        let start_snapshot = self
            .registry
            .with_session(&game_id, |session| {
                if seats_filled && session.status == GameStatus::Waiting {
                    session.status = GameStatus::Playing;
                    session.sequence_number += 1;
                    tracing::info!("Game {} started", game_id);
                    Some(session.snapshot(&self.server_id, None))
                } else {
                    None
                }
            })
            .await;
        if let Some(snapshot) = start_snapshot {
            self.replicator.publish(&snapshot).await;
        }

        // Reply with post-transition state, then notify every local seat
        self.registry
            .with_session(&game_id, |session| {
                state.conn.send_message(&ServerMessage::Joined {
                    game_id: game_id.clone(),
                    mark,
                    board: session.board,
                    next_turn: session.next_turn,
                    status: session.status,
                });
                session.broadcast(&ServerMessage::Update {
                    game_id: game_id.clone(),
                    board: session.board,
                    next_turn: session.next_turn,
                    status: session.status,
                    last_move: None,
                });
            })
            .await;
    }

    /// Validate, serialize, apply, and replicate one move
    pub async fn handle_move(&self, state: &mut ConnectionState, game_id: String, row: i64, col: i64) {
        let game_id = self.resolve_game_id(game_id);

        let mark = match (&state.game_id, state.mark) {
            (Some(joined), Some(mark)) if *joined == game_id => mark,
            _ => {
                send_error(&state.conn, "You must join the game first");
                return;
            }
        };

        if !(0..=2).contains(&row) || !(0..=2).contains(&col) {
            send_error(&state.conn, "row and col must be between 0 and 2");
            return;
        }
        let (row, col) = (row as usize, col as usize);

        // Cheap pre-check before going to the store for the mutex
        let precheck = self
            .registry
            .with_session(&game_id, |session| session.validate_move(mark, row, col))
            .await;
        if let Err(e) = precheck {
            send_error(&state.conn, &e.to_string());
            return;
        }

        if !self.locks.acquire_mutex(&game_id).await {
            send_error(&state.conn, "Game is being updated, please try again");
            return;
        }

        // Re-validate under the mutex: a peer's move may have been adopted
        // between the pre-check and the acquisition
        let applied = self
            .registry
            .with_session(&game_id, |session| {
                session.validate_move(mark, row, col)?;
                let outcome = session.apply_move(mark, row, col);
                let last_move = LastMove { mark, row, col };

                if outcome.is_terminal() {
                    session.broadcast(&ServerMessage::End {
                        game_id: game_id.clone(),
                        board: session.board,
                        winner: session.winner,
                    });
                } else {
                    session.broadcast(&ServerMessage::Update {
                        game_id: game_id.clone(),
                        board: session.board,
                        next_turn: session.next_turn,
                        status: session.status,
                        last_move: Some(last_move.clone()),
                    });
                }

                Ok::<(bool, SyncState), MoveError>((
                    outcome.is_terminal(),
                    session.snapshot(&self.server_id, Some(last_move)),
                ))
            })
            .await;

        match applied {
            Ok((terminal, snapshot)) => {
                // Publish while still holding the mutex, so peers never see
                // interleaved snapshots at the same sequence number
                self.replicator.publish(&snapshot).await;
                self.locks.release_mutex(&game_id).await;

                if terminal {
                    tracing::info!(
                        "Game {} finished (winner: {:?})",
                        game_id,
                        snapshot.winner
                    );
                    self.registry.schedule_eviction(&game_id).await;
                }
            }
            Err(e) => {
                self.locks.release_mutex(&game_id).await;
                send_error(&state.conn, &e.to_string());
            }
        }
    }

    /// Tear down whatever this connection held: its seat lease, its local
    /// registration, and its renewal task. The game state itself stays; the
    /// seat is simply free to claim again.
    pub async fn handle_close(&self, state: &ConnectionState) {
        let (Some(game_id), Some(mark)) = (&state.game_id, state.mark) else {
            return;
        };

        let held_here = self
            .registry
            .update(game_id, |session| {
                // A reconnect may already hold the seat on a newer
                // connection; only the current holder clears it
                if session.connection_id(mark) == Some(state.conn.id()) {
                    session.clear_seat(mark);
                    true
                } else {
                    false
                }
            })
            .await
            .unwrap_or(false);

        if held_here {
            self.locks.release_seat(game_id, mark).await;
            tracing::info!(
                "Connection {} left game {}, seat {} released",
                state.conn.id(),
                game_id,
                mark
            );
        }
    }

    fn resolve_game_id(&self, game_id: String) -> String {
        if game_id.is_empty() {
            self.default_game_id.clone()
        } else {
            game_id
        }
    }
}

fn send_error(conn: &Arc<dyn ClientConnection>, message: &str) {
    conn.send_message(&ServerMessage::Error {
        message: message.to_string(),
    });
}
