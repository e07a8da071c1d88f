//! Game Module
//!
//! Pure game rules, per-session state, and the process-local registry.

pub mod board;
pub mod registry;
pub mod session;

pub use board::{Board, Cell, Mark};
pub use registry::SessionRegistry;
pub use session::{GameSession, GameStatus, MoveError, MoveOutcome};
