//! Gridlock Configuration
//!
//! Configuration structures for a gridlock server process. Every timing
//! knob of the coordination layer (lease TTLs, renewal period, mutex TTL,
//! eviction delay, store reconnect backoff) lives here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main gridlock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridlockConfig {
    /// Server process configuration
    pub server: ServerConfig,

    /// Coordination store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Game session configuration
    #[serde(default)]
    pub game: GameConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind for client connections
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Unique process identity; derived from the bind port when unset.
    /// This is the owner id written into every lease.
    #[serde(default)]
    pub id: Option<String>,
}

/// Coordination store (lease + pub/sub) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Pub/sub channel name for state replication
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Seat lease TTL in seconds
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Seat lease renewal period in milliseconds (must be < lock TTL)
    #[serde(default = "default_lock_renewal_interval_ms")]
    pub lock_renewal_interval_ms: u64,

    /// Maximum store reconnection attempts before an operation fails
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: usize,

    /// Base reconnect delay in milliseconds
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Reconnect delay cap in milliseconds
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

/// Game session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Session move-mutex TTL in seconds
    #[serde(default = "default_mutex_ttl_secs")]
    pub mutex_ttl_secs: u64,

    /// Delay before a finished session is evicted, in milliseconds.
    /// Long enough for in-flight replicated snapshots to still land.
    #[serde(default = "default_cleanup_delay_ms")]
    pub cleanup_delay_ms: u64,

    /// Game id used when a client omits one
    #[serde(default = "default_game_id")]
    pub default_game_id: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_store_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_channel() -> String {
    "game_updates".to_string()
}

fn default_lock_ttl_secs() -> u64 {
    30
}

fn default_lock_renewal_interval_ms() -> u64 {
    10_000
}

fn default_max_reconnect_attempts() -> usize {
    10
}

fn default_reconnect_base_delay_ms() -> u64 {
    100
}

fn default_reconnect_max_delay_ms() -> u64 {
    3_000
}

fn default_mutex_ttl_secs() -> u64 {
    5
}

fn default_cleanup_delay_ms() -> u64 {
    30_000
}

fn default_game_id() -> String {
    "default".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            channel: default_channel(),
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_renewal_interval_ms: default_lock_renewal_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            mutex_ttl_secs: default_mutex_ttl_secs(),
            cleanup_delay_ms: default_cleanup_delay_ms(),
            default_game_id: default_game_id(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GridlockConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: GridlockConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.bind_address.is_empty() {
            return Err(crate::Error::Config(
                "server.bind_address cannot be empty".into(),
            ));
        }

        if self.store.url.is_empty() {
            return Err(crate::Error::Config("store.url cannot be empty".into()));
        }

        if self.store.channel.is_empty() {
            return Err(crate::Error::Config("store.channel cannot be empty".into()));
        }

        if self.store.lock_ttl_secs == 0 {
            return Err(crate::Error::Config("store.lock_ttl_secs must be > 0".into()));
        }

        // The renewal period must beat lease expiry or a healthy holder
        // loses its seat.
        if self.store.lock_renewal_interval_ms >= self.store.lock_ttl_secs * 1000 {
            return Err(crate::Error::Config(
                "store.lock_renewal_interval_ms must be less than the lock TTL".into(),
            ));
        }

        if self.game.mutex_ttl_secs == 0 {
            return Err(crate::Error::Config("game.mutex_ttl_secs must be > 0".into()));
        }

        Ok(())
    }

    /// Get the process identity (explicit id, or derived from the bind port)
    pub fn server_id(&self) -> String {
        if let Some(id) = &self.server.id {
            return id.clone();
        }
        let port = self
            .server
            .bind_address
            .rsplit(':')
            .next()
            .unwrap_or("0");
        format!("server-{}", port)
    }

    /// Get seat lease TTL as Duration
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.store.lock_ttl_secs)
    }

    /// Get seat lease renewal period as Duration
    pub fn lock_renewal_interval(&self) -> Duration {
        Duration::from_millis(self.store.lock_renewal_interval_ms)
    }

    /// Get session mutex TTL as Duration
    pub fn mutex_ttl(&self) -> Duration {
        Duration::from_secs(self.game.mutex_ttl_secs)
    }

    /// Get post-finish eviction delay as Duration
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.game.cleanup_delay_ms)
    }
}
