//! Coordination Store Abstraction
//!
//! The only cross-process shared resources are a lease store and a pub/sub
//! channel; this trait is exactly that capability and nothing more. The
//! production implementation is Redis-backed; tests and single-node runs
//! use the in-memory implementation.
//!
//! Delivery on the pub/sub side is at-least-once and unordered; callers
//! must filter by sequence number.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Lease and pub/sub primitives over the shared coordination store
#[async_trait]
pub trait CoordStore: Send + Sync {
    /// Atomically claim `key` for `owner` with an expiry of `ttl`.
    /// Succeeds iff the key has no live holder.
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Atomically extend the expiry of `key` iff `owner` still holds it.
    /// Returns whether the lease was extended.
    async fn renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Atomically clear `key` iff `owner` still holds it.
    /// Returns whether anything was released.
    async fn release(&self, key: &str, owner: &str) -> Result<bool>;

    /// Whether `key` currently has a live holder (any owner)
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Publish a payload on a named channel
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// Subscribe to a named channel; messages arrive on the returned
    /// receiver until the store connection is permanently lost.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>>;
}
