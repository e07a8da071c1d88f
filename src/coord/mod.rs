//! Coordination Module
//!
//! Everything shared between processes lives behind this module: the
//! lease/pub-sub store abstraction, the lock manager built on it, and the
//! snapshot replicator.

pub mod lock;
pub mod memory;
pub mod redis;
pub mod replicator;
pub mod store;

pub use lock::LockManager;
pub use memory::MemoryStore;
pub use replicator::Replicator;
pub use store::CoordStore;

pub use self::redis::RedisStore;

use crate::game::board::Mark;

/// Store key for one seat lease
pub fn seat_key(game_id: &str, mark: Mark) -> String {
    format!("session:{}:player:{}", game_id, mark)
}

/// Store key for one session's move mutex
pub fn mutex_key(game_id: &str) -> String {
    format!("session:{}:mutex", game_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespace() {
        assert_eq!(seat_key("g1", Mark::X), "session:g1:player:X");
        assert_eq!(seat_key("g1", Mark::O), "session:g1:player:O");
        assert_eq!(mutex_key("g1"), "session:g1:mutex");
    }
}
