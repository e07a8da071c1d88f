//! Board Rules
//!
//! The 3x3 grid and the pure win/draw evaluation over it.

use serde::{Deserialize, Serialize};

/// A player mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    /// The opposing mark
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Parse a mark from its wire representation
    pub fn parse(s: &str) -> Option<Mark> {
        match s {
            "X" => Some(Mark::X),
            "O" => Some(Mark::O),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

/// A single board cell; `None` is empty
pub type Cell = Option<Mark>;

/// The 3x3 board
pub type Board = [[Cell; 3]; 3];

/// Create an empty board
pub fn empty_board() -> Board {
    [[None; 3]; 3]
}

/// The 8 winnable lines: 3 rows, 3 columns, 2 diagonals
const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// Return the mark occupying a full line, if any.
///
/// Cells are only ever set once and marks alternate, so at most one line
/// can be complete when this runs after a move; first match wins.
pub fn winner(board: &Board) -> Option<Mark> {
    for line in &LINES {
        let [a, b, c] = line;
        if let Some(mark) = board[a.0][a.1] {
            if board[b.0][b.1] == Some(mark) && board[c.0][c.1] == Some(mark) {
                return Some(mark);
            }
        }
    }
    None
}

/// True iff no cell is empty
pub fn is_full(board: &Board) -> bool {
    board.iter().all(|row| row.iter().all(|cell| cell.is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_row() {
        let mut board = empty_board();
        board[1] = [Some(Mark::X), Some(Mark::X), Some(Mark::X)];
        assert_eq!(winner(&board), Some(Mark::X));
    }

    #[test]
    fn test_winner_column() {
        let mut board = empty_board();
        board[0][2] = Some(Mark::O);
        board[1][2] = Some(Mark::O);
        board[2][2] = Some(Mark::O);
        assert_eq!(winner(&board), Some(Mark::O));
    }

    #[test]
    fn test_winner_diagonals() {
        let mut board = empty_board();
        board[0][0] = Some(Mark::X);
        board[1][1] = Some(Mark::X);
        board[2][2] = Some(Mark::X);
        assert_eq!(winner(&board), Some(Mark::X));

        let mut board = empty_board();
        board[0][2] = Some(Mark::O);
        board[1][1] = Some(Mark::O);
        board[2][0] = Some(Mark::O);
        assert_eq!(winner(&board), Some(Mark::O));
    }

    #[test]
    fn test_no_winner() {
        assert_eq!(winner(&empty_board()), None);

        // Full board, no line
        let board: Board = [
            [Some(Mark::X), Some(Mark::O), Some(Mark::X)],
            [Some(Mark::X), Some(Mark::O), Some(Mark::O)],
            [Some(Mark::O), Some(Mark::X), Some(Mark::X)],
        ];
        assert_eq!(winner(&board), None);
    }

    #[test]
    fn test_is_full() {
        let mut board: Board = [
            [Some(Mark::X), Some(Mark::O), Some(Mark::X)],
            [Some(Mark::X), Some(Mark::O), Some(Mark::O)],
            [Some(Mark::O), Some(Mark::X), Some(Mark::X)],
        ];
        assert!(is_full(&board));

        board[2][2] = None;
        assert!(!is_full(&board));
    }
}
