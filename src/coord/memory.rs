//! In-Memory Coordination Store
//!
//! Single-process stand-in for the shared store. Leases live in a map with
//! explicit expiry instants; the pub/sub channel is a broadcast channel, so
//! several server instances inside one test process see each other's
//! snapshots exactly as separate processes would through Redis.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::coord::store::CoordStore;
use crate::error::Result;

/// In-memory lease + pub/sub store
pub struct MemoryStore {
    /// key -> (owner, expiry)
    entries: Mutex<HashMap<String, (String, Instant)>>,
    /// channel name -> broadcast sender
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Drop the entry for `key` if its lease has expired
    fn purge_expired(entries: &mut HashMap<String, (String, Instant)>, key: &str) {
        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at <= Instant::now() {
                entries.remove(key);
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordStore for MemoryStore {
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries, key);

        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (owner.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries, key);

        match entries.get_mut(key) {
            Some((holder, expires_at)) if holder == owner => {
                *expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries, key);

        match entries.get(key) {
            Some((holder, _)) if holder == owner => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries, key);
        Ok(entries.contains_key(key))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let channels = self.channels.lock().await;
        if let Some(tx) = channels.get(channel) {
            // No subscribers is not an error, matching pub/sub semantics
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>> {
        let mut channels = self.channels.lock().await;
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(256).0);
        let mut sub = sender.subscribe();

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            loop {
                match sub.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    // A lagged subscriber just misses messages, like a slow
                    // pub/sub consumer would
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Memory store subscriber lagged, skipped {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}
