//! Gridlock Error Types

use thiserror::Error;

/// Result type alias for gridlock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Gridlock error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Coordination store errors
    #[error("Coordination store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Coordination store unavailable: {0}")]
    StoreUnavailable(String),

    // Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Store(_) | Error::StoreUnavailable(_) | Error::Network(_)
        )
    }
}
