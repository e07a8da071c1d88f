//! Redis Coordination Store
//!
//! Production implementation of [`CoordStore`] on Redis. Leases use
//! `SET NX EX` for acquisition and small Lua scripts for renewal and
//! release, so that compare-and-extend / compare-and-clear are single
//! atomic operations instead of the racy read-then-write they replace.
//!
//! Command connections go through a `ConnectionManager`, which reconnects
//! with capped exponential backoff; the subscription keeps its own
//! connection and re-subscribes with the same backoff when it drops.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tokio::sync::mpsc;

use crate::config::StoreConfig;
use crate::coord::store::CoordStore;
use crate::error::Result;

/// Extend the expiry only while we still hold the key
const RENEW_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('EXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Delete the key only while we still hold it
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Redis-backed lease + pub/sub store
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    reconnect_base_delay: Duration,
    reconnect_max_delay: Duration,
}

impl RedisStore {
    /// Connect to Redis. Failure here is fatal at boot; afterwards the
    /// connection manager reconnects on its own.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;

        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(config.max_reconnect_attempts)
            .set_factor(config.reconnect_base_delay_ms)
            .set_max_delay(config.reconnect_max_delay_ms);

        let conn = client
            .get_connection_manager_with_config(manager_config)
            .await?;

        tracing::info!("Connected to coordination store at {}", config.url);

        Ok(Self {
            client,
            conn,
            reconnect_base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            reconnect_max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
        })
    }

    /// TTLs are expressed in whole seconds on the wire; never round to zero
    fn ttl_secs(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }
}

#[async_trait]
impl CoordStore for RedisStore {
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("EX")
            .arg(Self::ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = redis::Script::new(RENEW_SCRIPT)
            .key(key)
            .arg(owner)
            .arg(Self::ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>> {
        let (tx, rx) = mpsc::channel(256);
        let client = self.client.clone();
        let channel = channel.to_string();
        let base_delay = self.reconnect_base_delay;
        let max_delay = self.reconnect_max_delay;

        // Verify the subscription works before handing back the receiver,
        // so a bad store address fails loudly at boot.
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        tokio::spawn(async move {
            let mut pubsub = Some(pubsub);
            let mut attempt: u32 = 0;

            loop {
                let mut current = match pubsub.take() {
                    Some(p) => p,
                    None => {
                        let delay = (base_delay * 2u32.saturating_pow(attempt)).min(max_delay);
                        attempt = attempt.saturating_add(1);
                        tracing::warn!(
                            "Replication subscription lost, reconnecting in {:?}",
                            delay
                        );
                        tokio::time::sleep(delay).await;

                        match client.get_async_pubsub().await {
                            Ok(mut p) => match p.subscribe(&channel).await {
                                Ok(()) => {
                                    tracing::info!("Replication subscription re-established");
                                    p
                                }
                                Err(e) => {
                                    tracing::warn!("Re-subscribe failed: {}", e);
                                    continue;
                                }
                            },
                            Err(e) => {
                                tracing::warn!("Store reconnect failed: {}", e);
                                continue;
                            }
                        }
                    }
                };
                attempt = 0;

                let mut stream = current.on_message();
                while let Some(msg) = stream.next().await {
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!("Unreadable pub/sub payload: {}", e);
                            continue;
                        }
                    };
                    if tx.send(payload).await.is_err() {
                        // Receiver dropped, subscription no longer wanted
                        return;
                    }
                }
                // Stream ended: connection dropped, loop around to reconnect
            }
        });

        Ok(rx)
    }
}
