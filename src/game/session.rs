//! Game Session
//!
//! Per-session state held by one process: the replicated fields (board,
//! turn, status, winner, sequence number) plus the process-local fields
//! that never leave this process (connection handles, lease renewal tasks).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::game::board::{self, Board, Mark};
use crate::protocol::{LastMove, ServerMessage, SyncState};
use crate::server::connection::ClientConnection;

/// Session status; transitions only ever move forward
/// (waiting -> playing -> finished)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Playing,
    Finished,
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameStatus::Waiting => write!(f, "waiting"),
            GameStatus::Playing => write!(f, "playing"),
            GameStatus::Finished => write!(f, "finished"),
        }
    }
}

/// Why a move was rejected; the message is sent to the client verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("Game is not in playing state")]
    NotPlaying,

    #[error("It is not your turn, current turn: {0}")]
    NotYourTurn(Mark),

    #[error("row and col must be between 0 and 2")]
    OutOfRange,

    #[error("Cell already occupied")]
    CellOccupied,
}

/// Result of an accepted move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Game continues, turn has flipped
    Continue,
    /// The moving mark completed a line
    Won(Mark),
    /// Board filled with no winner
    Draw,
}

impl MoveOutcome {
    /// True if the move ended the game
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MoveOutcome::Continue)
    }
}

/// One game session as seen by this process
pub struct GameSession {
    /// Opaque session key
    pub id: String,
    /// Current board
    pub board: Board,
    /// Mark whose move is expected
    pub next_turn: Mark,
    /// Current status (monotone)
    pub status: GameStatus,
    /// Winning mark; meaningful only when finished
    pub winner: Option<Mark>,
    /// Ordering token for replication; bumped once per accepted mutation
    pub sequence_number: u64,
    /// Creation time, diagnostic only
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Local connections per seat; never replicated
    connections: HashMap<Mark, Arc<dyn ClientConnection>>,
    /// Seat lease renewal tasks; never replicated
    renewals: HashMap<Mark, JoinHandle<()>>,
}

impl GameSession {
    /// Create a fresh session in the waiting state
    pub fn new(id: String) -> Self {
        Self {
            id,
            board: board::empty_board(),
            next_turn: Mark::X,
            status: GameStatus::Waiting,
            winner: None,
            sequence_number: 0,
            created_at: chrono::Utc::now(),
            connections: HashMap::new(),
            renewals: HashMap::new(),
        }
    }

    /// Check move legality without mutating anything
    pub fn validate_move(&self, mark: Mark, row: usize, col: usize) -> Result<(), MoveError> {
        if self.status != GameStatus::Playing {
            return Err(MoveError::NotPlaying);
        }
        if self.next_turn != mark {
            return Err(MoveError::NotYourTurn(self.next_turn));
        }
        if row > 2 || col > 2 {
            return Err(MoveError::OutOfRange);
        }
        if self.board[row][col].is_some() {
            return Err(MoveError::CellOccupied);
        }
        Ok(())
    }

    /// Apply a validated move: set the cell, bump the sequence number,
    /// evaluate the outcome, and either finish the game or flip the turn.
    pub fn apply_move(&mut self, mark: Mark, row: usize, col: usize) -> MoveOutcome {
        self.board[row][col] = Some(mark);
        self.sequence_number += 1;

        if let Some(winner) = board::winner(&self.board) {
            self.status = GameStatus::Finished;
            self.winner = Some(winner);
            return MoveOutcome::Won(winner);
        }

        if board::is_full(&self.board) {
            self.status = GameStatus::Finished;
            self.winner = None;
            return MoveOutcome::Draw;
        }

        self.next_turn = self.next_turn.other();
        MoveOutcome::Continue
    }

    /// Adopt a replicated snapshot wholesale. Returns false (and changes
    /// nothing) when the snapshot is stale or a duplicate; the replication
    /// channel is at-least-once and may reorder.
    pub fn apply_snapshot(&mut self, msg: &SyncState) -> bool {
        if msg.sequence_number <= self.sequence_number {
            return false;
        }

        self.board = msg.board;
        self.next_turn = msg.next_turn;
        self.status = msg.status;
        self.winner = msg.winner;
        self.sequence_number = msg.sequence_number;
        true
    }

    /// Build the replication snapshot of the current state
    pub fn snapshot(&self, origin: &str, last_move: Option<LastMove>) -> SyncState {
        SyncState {
            origin: origin.to_string(),
            game_id: self.id.clone(),
            board: self.board,
            next_turn: self.next_turn,
            status: self.status,
            winner: self.winner,
            sequence_number: self.sequence_number,
            last_move,
        }
    }

    /// Register the local connection holding a seat
    pub fn register_connection(&mut self, mark: Mark, conn: Arc<dyn ClientConnection>) {
        self.connections.insert(mark, conn);
    }

    /// Id of the connection currently holding a seat locally
    pub fn connection_id(&self, mark: Mark) -> Option<Uuid> {
        self.connections.get(&mark).map(|c| c.id())
    }

    /// Attach the renewal task for a seat lease, replacing any previous one
    pub fn set_renewal(&mut self, mark: Mark, handle: JoinHandle<()>) {
        if let Some(previous) = self.renewals.insert(mark, handle) {
            previous.abort();
        }
    }

    /// Drop a seat's local registration and cancel its lease renewal
    pub fn clear_seat(&mut self, mark: Mark) {
        self.connections.remove(&mark);
        if let Some(handle) = self.renewals.remove(&mark) {
            handle.abort();
        }
    }

    /// Send a message to every open local connection of this session
    pub fn broadcast(&self, msg: &ServerMessage) {
        for conn in self.connections.values() {
            if conn.is_open() {
                conn.send_message(msg);
            }
        }
    }

    /// Cancel all background renewal tasks; called on eviction
    pub fn shutdown(&mut self) {
        for (_, handle) in self.renewals.drain() {
            handle.abort();
        }
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing_session() -> GameSession {
        let mut session = GameSession::new("g1".to_string());
        session.status = GameStatus::Playing;
        session.sequence_number = 1;
        session
    }

    #[test]
    fn test_move_flips_turn_and_bumps_sequence() {
        let mut session = playing_session();
        assert!(session.validate_move(Mark::X, 0, 0).is_ok());

        let outcome = session.apply_move(Mark::X, 0, 0);
        assert_eq!(outcome, MoveOutcome::Continue);
        assert_eq!(session.next_turn, Mark::O);
        assert_eq!(session.sequence_number, 2);
        assert_eq!(session.board[0][0], Some(Mark::X));
    }

    #[test]
    fn test_move_rejections() {
        let mut session = GameSession::new("g1".to_string());
        assert_eq!(
            session.validate_move(Mark::X, 0, 0),
            Err(MoveError::NotPlaying)
        );

        session.status = GameStatus::Playing;
        assert_eq!(
            session.validate_move(Mark::O, 0, 0),
            Err(MoveError::NotYourTurn(Mark::X))
        );
        assert_eq!(
            session.validate_move(Mark::X, 3, 0),
            Err(MoveError::OutOfRange)
        );

        session.apply_move(Mark::X, 1, 1);
        assert_eq!(
            session.validate_move(Mark::O, 1, 1),
            Err(MoveError::CellOccupied)
        );
    }

    #[test]
    fn test_winning_move_finishes_game() {
        let mut session = playing_session();
        session.apply_move(Mark::X, 0, 0);
        session.apply_move(Mark::O, 1, 0);
        session.apply_move(Mark::X, 0, 1);
        session.apply_move(Mark::O, 1, 1);
        let outcome = session.apply_move(Mark::X, 0, 2);

        assert_eq!(outcome, MoveOutcome::Won(Mark::X));
        assert_eq!(session.status, GameStatus::Finished);
        assert_eq!(session.winner, Some(Mark::X));
        // Turn does not flip after a terminal move
        assert_eq!(session.next_turn, Mark::X);
    }

    #[test]
    fn test_draw_finishes_game_without_winner() {
        let mut session = playing_session();
        let moves = [
            (Mark::X, 0, 0),
            (Mark::O, 0, 1),
            (Mark::X, 0, 2),
            (Mark::O, 1, 1),
            (Mark::X, 1, 0),
            (Mark::O, 1, 2),
            (Mark::X, 2, 1),
            (Mark::O, 2, 0),
        ];
        for (mark, row, col) in moves {
            assert_eq!(session.apply_move(mark, row, col), MoveOutcome::Continue);
        }

        let outcome = session.apply_move(Mark::X, 2, 2);
        assert_eq!(outcome, MoveOutcome::Draw);
        assert_eq!(session.status, GameStatus::Finished);
        assert_eq!(session.winner, None);
    }

    #[test]
    fn test_stale_snapshot_is_ignored() {
        let mut session = playing_session();
        let mut newer = session.snapshot("peer", None);
        newer.sequence_number = 5;
        newer.board[2][2] = Some(Mark::O);
        newer.status = GameStatus::Playing;

        assert!(session.apply_snapshot(&newer));
        assert_eq!(session.sequence_number, 5);
        assert_eq!(session.board[2][2], Some(Mark::O));

        // A reordered older snapshot must leave the state at seq 5
        let mut stale = session.snapshot("peer", None);
        stale.sequence_number = 3;
        stale.board[2][2] = None;
        assert!(!session.apply_snapshot(&stale));
        assert_eq!(session.sequence_number, 5);
        assert_eq!(session.board[2][2], Some(Mark::O));
    }
}
