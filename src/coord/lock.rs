//! Lock Manager
//!
//! Time-bounded leases over the coordination store, used for two things:
//! seat ownership (long TTL, renewed in the background) and the
//! per-session move mutex (short TTL, held across mutate-then-publish).
//!
//! Expiry is the safety net: a crashed process's leases self-heal after
//! their TTL with no explicit failure detector. Store outages fail soft;
//! every operation here degrades to "not acquired" or a logged warning.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::coord::{mutex_key, seat_key, store::CoordStore};
use crate::game::board::Mark;

/// Lease operations bound to one process identity
pub struct LockManager {
    store: Arc<dyn CoordStore>,
    /// Owner id written into every lease
    server_id: String,
    /// Seat lease TTL
    lock_ttl: Duration,
    /// Seat lease renewal period; strictly less than `lock_ttl`
    renewal_interval: Duration,
    /// Session mutex TTL
    mutex_ttl: Duration,
}

impl LockManager {
    /// Create a lock manager for this process
    pub fn new(
        store: Arc<dyn CoordStore>,
        server_id: String,
        lock_ttl: Duration,
        renewal_interval: Duration,
        mutex_ttl: Duration,
    ) -> Self {
        Self {
            store,
            server_id,
            lock_ttl,
            renewal_interval,
            mutex_ttl,
        }
    }

    /// This process's lease owner id
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Try to claim a seat for this process. False on contention and on
    /// store failure alike; the caller cannot tell and does not need to.
    pub async fn acquire_seat(&self, game_id: &str, mark: Mark) -> bool {
        let key = seat_key(game_id, mark);
        match self.store.acquire(&key, &self.server_id, self.lock_ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                tracing::warn!("Seat acquire failed against store for {}: {}", key, e);
                false
            }
        }
    }

    /// Whether a seat is held by anyone, on any process
    pub async fn seat_exists(&self, game_id: &str, mark: Mark) -> bool {
        let key = seat_key(game_id, mark);
        match self.store.exists(&key).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!("Seat existence check failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Spawn the periodic renewal task for a held seat lease. The caller
    /// owns the handle and must abort it on release or disconnect.
    pub fn start_seat_renewal(&self, game_id: &str, mark: Mark) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let owner = self.server_id.clone();
        let key = seat_key(game_id, mark);
        let ttl = self.lock_ttl;
        let period = self.renewal_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; the lease was just acquired
            interval.tick().await;

            loop {
                interval.tick().await;
                match store.renew(&key, &owner, ttl).await {
                    Ok(true) => tracing::trace!("Renewed lease {}", key),
                    Ok(false) => {
                        // Expired and possibly re-acquired elsewhere; keep
                        // trying, the TTL has already done its job
                        tracing::warn!("Lease {} is no longer held by {}", key, owner);
                    }
                    Err(e) => tracing::warn!("Failed to renew lease {}: {}", key, e),
                }
            }
        })
    }

    /// Best-effort seat release; TTL expiry is the backstop
    pub async fn release_seat(&self, game_id: &str, mark: Mark) {
        let key = seat_key(game_id, mark);
        match self.store.release(&key, &self.server_id).await {
            Ok(true) => tracing::debug!("Released seat lease {}", key),
            Ok(false) => tracing::debug!("Seat lease {} was not ours to release", key),
            Err(e) => tracing::warn!("Failed to release seat lease {}: {}", key, e),
        }
    }

    /// Try to take the session move mutex
    pub async fn acquire_mutex(&self, game_id: &str) -> bool {
        let key = mutex_key(game_id);
        match self.store.acquire(&key, &self.server_id, self.mutex_ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                tracing::warn!("Mutex acquire failed against store for {}: {}", key, e);
                false
            }
        }
    }

    /// Release the session move mutex; called on every exit path
    pub async fn release_mutex(&self, game_id: &str) {
        let key = mutex_key(game_id);
        match self.store.release(&key, &self.server_id).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Mutex {} expired before release", key),
            Err(e) => tracing::warn!("Failed to release mutex {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::MemoryStore;

    fn manager(store: Arc<MemoryStore>, id: &str) -> LockManager {
        LockManager::new(
            store,
            id.to_string(),
            Duration::from_millis(100),
            Duration::from_millis(30),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_seat_exclusive_across_processes() {
        let store = Arc::new(MemoryStore::new());
        let a = manager(Arc::clone(&store), "server-a");
        let b = manager(Arc::clone(&store), "server-b");

        let (got_a, got_b) =
            tokio::join!(a.acquire_seat("g1", Mark::X), b.acquire_seat("g1", Mark::X));
        assert_ne!(got_a, got_b);

        // The other seat is still free
        assert!(b.acquire_seat("g1", Mark::O).await);
        assert!(a.seat_exists("g1", Mark::X).await);
        assert!(a.seat_exists("g1", Mark::O).await);
    }

    #[tokio::test]
    async fn test_renewal_keeps_lease_alive() {
        let store = Arc::new(MemoryStore::new());
        let a = manager(Arc::clone(&store), "server-a");

        assert!(a.acquire_seat("g1", Mark::X).await);
        let renewal = a.start_seat_renewal("g1", Mark::X);

        // Well past the 100ms TTL, the renewal task has kept it alive
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(a.seat_exists("g1", Mark::X).await);

        // Cancelled renewal lets the lease expire
        renewal.abort();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!a.seat_exists("g1", Mark::X).await);
    }

    #[tokio::test]
    async fn test_mutex_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let a = manager(Arc::clone(&store), "server-a");
        let b = manager(Arc::clone(&store), "server-b");

        assert!(a.acquire_mutex("g1").await);
        assert!(!b.acquire_mutex("g1").await);

        a.release_mutex("g1").await;
        assert!(b.acquire_mutex("g1").await);
    }

    #[tokio::test]
    async fn test_release_ignores_foreign_lease() {
        let store = Arc::new(MemoryStore::new());
        let a = manager(Arc::clone(&store), "server-a");
        let b = manager(Arc::clone(&store), "server-b");

        assert!(a.acquire_seat("g1", Mark::X).await);
        // b never held it; release must not clear a's lease
        b.release_seat("g1", Mark::X).await;
        assert!(a.seat_exists("g1", Mark::X).await);
    }
}
