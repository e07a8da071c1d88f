//! Session Protocol
//!
//! JSON wire messages: client to server, server to client, and the
//! cross-process `sync_state` replication payload. Field names follow the
//! wire convention (camelCase), so the shapes here are the contract.

use serde::{Deserialize, Serialize};

use crate::game::board::{Board, Mark};
use crate::game::session::GameStatus;

/// The last accepted move, echoed in updates and replication messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMove {
    pub mark: Mark,
    pub row: usize,
    pub col: usize,
}

/// Client to server messages
///
/// `mark`, `row`, and `col` are left loosely typed so a bad value yields a
/// specific protocol error instead of a generic parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        #[serde(rename = "gameId", default)]
        game_id: String,
        #[serde(default)]
        mark: String,
    },
    Move {
        #[serde(rename = "gameId", default)]
        game_id: String,
        #[serde(default = "missing_coord")]
        row: i64,
        #[serde(default = "missing_coord")]
        col: i64,
    },
}

/// Sentinel for an absent coordinate; always fails the range check
fn missing_coord() -> i64 {
    -1
}

/// Server to client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Joined {
        game_id: String,
        mark: Mark,
        board: Board,
        next_turn: Mark,
        status: GameStatus,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        game_id: String,
        board: Board,
        next_turn: Mark,
        status: GameStatus,
        last_move: Option<LastMove>,
    },
    #[serde(rename_all = "camelCase")]
    End {
        game_id: String,
        board: Board,
        winner: Option<Mark>,
    },
    Error { message: String },
}

/// Whole-session state snapshot replicated between processes.
///
/// This is state-transfer replication: the full state every time, never a
/// diff. `sequence_number` is the sole ordering token; `origin` suppresses
/// the publisher's own echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "sync_state", rename_all = "camelCase")]
pub struct SyncState {
    pub origin: String,
    pub game_id: String,
    pub board: Board,
    pub next_turn: Mark,
    pub status: GameStatus,
    pub winner: Option<Mark>,
    pub sequence_number: u64,
    pub last_move: Option<LastMove>,
}
