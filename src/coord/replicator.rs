//! State Replicator
//!
//! Publishes whole-session snapshots on the shared channel and applies
//! snapshots published by peer processes into the local registry.
//!
//! Convergence is by sequence number alone: only the mutex-holding process
//! computes a mutation, so there is never a merge; every process simply
//! adopts the highest sequence number it has seen. Echoes of our own
//! publishes and stale or duplicated deliveries are dropped.

use std::sync::Arc;

use crate::coord::store::CoordStore;
use crate::error::Result;
use crate::game::registry::SessionRegistry;
use crate::game::session::GameStatus;
use crate::protocol::{ServerMessage, SyncState};

/// Snapshot publisher + subscription applier for one process
pub struct Replicator {
    store: Arc<dyn CoordStore>,
    /// Replication channel name
    channel: String,
    /// This process's id, used to suppress echoes
    server_id: String,
}

impl Replicator {
    /// Create a replicator for this process
    pub fn new(store: Arc<dyn CoordStore>, channel: String, server_id: String) -> Self {
        Self {
            store,
            channel,
            server_id,
        }
    }

    /// Publish a snapshot. A store outage makes this a logged no-op; the
    /// session mutex has still serialized the mutation, and the next
    /// successful publish carries the full state anyway.
    pub async fn publish(&self, snapshot: &SyncState) {
        let payload = match serde_json::to_string(snapshot) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to encode sync_state: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.publish(&self.channel, &payload).await {
            tracing::warn!(
                "Publish of game {} seq {} failed: {}",
                snapshot.game_id,
                snapshot.sequence_number,
                e
            );
        }
    }

    /// Subscribe to the replication channel and apply snapshots into the
    /// registry until the subscription ends. Runs for the process lifetime.
    pub async fn run(&self, registry: Arc<SessionRegistry>) -> Result<()> {
        let mut rx = self.store.subscribe(&self.channel).await?;
        tracing::info!("Subscribed to replication channel {}", self.channel);

        while let Some(raw) = rx.recv().await {
            let msg: SyncState = match serde_json::from_str(&raw) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Malformed sync_state message: {}", e);
                    continue;
                }
            };
            self.apply(&msg, &registry).await;
        }

        tracing::warn!("Replication channel {} closed", self.channel);
        Ok(())
    }

    /// Apply one received snapshot into the local registry
    async fn apply(&self, msg: &SyncState, registry: &Arc<SessionRegistry>) {
        if msg.origin == self.server_id {
            return;
        }

        let adopted = registry
            .with_session(&msg.game_id, |session| {
                if !session.apply_snapshot(msg) {
                    tracing::debug!(
                        "Ignoring stale sync message for game {} (seq {} <= {})",
                        msg.game_id,
                        msg.sequence_number,
                        session.sequence_number
                    );
                    return None;
                }

                if session.status == GameStatus::Finished {
                    session.broadcast(&ServerMessage::End {
                        game_id: msg.game_id.clone(),
                        board: session.board,
                        winner: session.winner,
                    });
                    Some(GameStatus::Finished)
                } else {
                    session.broadcast(&ServerMessage::Update {
                        game_id: msg.game_id.clone(),
                        board: session.board,
                        next_turn: session.next_turn,
                        status: session.status,
                        last_move: msg.last_move.clone(),
                    });
                    Some(session.status)
                }
            })
            .await;

        match adopted {
            Some(GameStatus::Finished) => {
                // Same deferred eviction as a locally-finished game
                registry.schedule_eviction(&msg.game_id).await;
            }
            Some(_) => {
                // The session is live again; a pending eviction from an
                // earlier finished snapshot no longer applies
                registry.cancel_eviction(&msg.game_id).await;
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::MemoryStore;
    use crate::game::board::{empty_board, Mark};
    use std::time::Duration;

    fn snapshot(origin: &str, seq: u64, status: GameStatus) -> SyncState {
        let mut board = empty_board();
        board[0][0] = Some(Mark::X);
        SyncState {
            origin: origin.to_string(),
            game_id: "g1".to_string(),
            board,
            next_turn: Mark::O,
            status,
            winner: None,
            sequence_number: seq,
            last_move: None,
        }
    }

    #[tokio::test]
    async fn test_applies_remote_snapshot_and_ignores_echo() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SessionRegistry::new(Duration::from_secs(30)));
        let replicator = Replicator::new(store, "ch".to_string(), "server-a".to_string());

        // Echo of our own publish changes nothing
        replicator
            .apply(&snapshot("server-a", 3, GameStatus::Playing), &registry)
            .await;
        assert!(!registry.contains("g1").await);

        // A peer's snapshot creates and populates the session
        replicator
            .apply(&snapshot("server-b", 3, GameStatus::Playing), &registry)
            .await;
        let seq = registry.update("g1", |s| s.sequence_number).await;
        assert_eq!(seq, Some(3));
    }

    #[tokio::test]
    async fn test_stale_snapshot_leaves_state() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SessionRegistry::new(Duration::from_secs(30)));
        let replicator = Replicator::new(store, "ch".to_string(), "server-a".to_string());

        replicator
            .apply(&snapshot("server-b", 5, GameStatus::Playing), &registry)
            .await;
        replicator
            .apply(&snapshot("server-b", 3, GameStatus::Playing), &registry)
            .await;

        let seq = registry.update("g1", |s| s.sequence_number).await;
        assert_eq!(seq, Some(5));
    }

    #[tokio::test]
    async fn test_finished_snapshot_schedules_eviction() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SessionRegistry::new(Duration::from_millis(30)));
        let replicator = Replicator::new(store, "ch".to_string(), "server-a".to_string());

        replicator
            .apply(&snapshot("server-b", 4, GameStatus::Finished), &registry)
            .await;
        assert!(registry.contains("g1").await);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!registry.contains("g1").await);
    }

    #[tokio::test]
    async fn test_revival_cancels_pending_eviction() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SessionRegistry::new(Duration::from_millis(40)));
        let replicator = Replicator::new(store, "ch".to_string(), "server-a".to_string());

        replicator
            .apply(&snapshot("server-b", 4, GameStatus::Finished), &registry)
            .await;
        // Higher-sequence live snapshot arrives before the delay elapses
        replicator
            .apply(&snapshot("server-b", 5, GameStatus::Playing), &registry)
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.contains("g1").await);
    }
}
