//! Session Registry
//!
//! Process-local map from game id to session state. Sessions are created
//! lazily on first reference (a join attempt, or an inbound replicated
//! snapshot for an unseen id) and evicted a fixed delay after finishing so
//! that in-flight snapshots can still be applied.
//!
//! The registry is an owned, injected object rather than a module-level
//! global, so multiple server instances can coexist in one test process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::game::session::GameSession;

/// Registry of live sessions on this process
pub struct SessionRegistry {
    /// Sessions by game id
    sessions: RwLock<HashMap<String, GameSession>>,
    /// Pending deferred evictions by game id
    evictions: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Delay between a session finishing and its eviction
    cleanup_delay: Duration,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new(cleanup_delay: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            evictions: Mutex::new(HashMap::new()),
            cleanup_delay,
        }
    }

    /// Run a closure against the session for `game_id`, creating it in the
    /// waiting state if this is the first local reference.
    pub async fn with_session<F, R>(&self, game_id: &str, f: F) -> R
    where
        F: FnOnce(&mut GameSession) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(game_id.to_string())
            .or_insert_with(|| GameSession::new(game_id.to_string()));
        f(session)
    }

    /// Run a closure against an existing session; None if it is not here
    pub async fn update<F, R>(&self, game_id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut GameSession) -> R,
    {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(game_id).map(f)
    }

    /// Whether a session is currently held locally
    pub async fn contains(&self, game_id: &str) -> bool {
        self.sessions.read().await.contains_key(game_id)
    }

    /// Number of sessions currently held locally
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the registry holds no sessions
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Schedule the deferred eviction of a finished session, replacing any
    /// eviction already pending for the same id.
    pub async fn schedule_eviction(self: &Arc<Self>, game_id: &str) {
        let registry = Arc::clone(self);
        let id = game_id.to_string();
        let delay = self.cleanup_delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.evict(&id).await;
        });

        let mut evictions = self.evictions.lock().await;
        if let Some(previous) = evictions.insert(game_id.to_string(), handle) {
            previous.abort();
        }
    }

    /// Cancel a pending eviction, if any. Called when a session revives
    /// (a snapshot with a higher sequence number arrives before the delay
    /// elapses).
    pub async fn cancel_eviction(&self, game_id: &str) {
        let mut evictions = self.evictions.lock().await;
        if let Some(handle) = evictions.remove(game_id) {
            handle.abort();
            tracing::debug!("Cancelled pending eviction for game {}", game_id);
        }
    }

    /// Remove a session now, cancelling its background renewal tasks
    async fn evict(&self, game_id: &str) {
        self.evictions.lock().await.remove(game_id);

        let mut sessions = self.sessions.write().await;
        if let Some(mut session) = sessions.remove(game_id) {
            session.shutdown();
            tracing::info!("Cleaned up finished game: {}", game_id);
        }
    }
}
