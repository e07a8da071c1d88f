//! Gridlock - Distributed Turn-Based Game Session Coordinator
//!
//! A horizontally-scaled server for two-player turn-based game sessions.
//! Any number of stateless gridlock processes can sit behind a gateway;
//! the two players of one session may be connected to different processes.
//!
//! # Architecture
//!
//! Gridlock keeps the game itself trivial and puts the work into
//! cross-process coordination:
//!
//! - TTL-bound seat leases give each mark exactly one owner across the
//!   whole fleet, with no failure detector beyond lease expiry.
//! - A short-lived per-session mutex serializes the read-modify-publish
//!   sequence for moves, across processes and across connections on the
//!   same process.
//! - Full-state snapshots tagged with a per-session sequence number are
//!   broadcast over a shared pub/sub channel; every process converges by
//!   adopting the highest sequence number it has seen.
//!
//! # Features
//!
//! - Lease-based exclusive seat assignment with background renewal
//! - Sequence-numbered state-transfer replication (tolerates duplicated
//!   and reordered deliveries)
//! - Transport-independent session protocol handler
//! - Newline-delimited JSON over TCP as the shipped transport

pub mod config;
pub mod coord;
pub mod error;
pub mod game;
pub mod protocol;
pub mod server;

pub use config::GridlockConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::GridlockConfig;
    pub use crate::coord::{CoordStore, LockManager, Replicator};
    pub use crate::error::{Error, Result};
    pub use crate::game::{Board, GameSession, GameStatus, Mark, SessionRegistry};
    pub use crate::protocol::{ClientMessage, ServerMessage, SyncState};
    pub use crate::server::SessionServer;
}
