//! Error types for guardcache
//!
//! Policy refusals, consent blocks and read-path crypto failures are not
//! errors; they surface as `false`/`None` returns and in statistics.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for guardcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the library
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Consent(#[from] ConsentError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A deduplicated producer failed; every joined caller sees the same error.
    #[error("Producer failed: {0}")]
    Producer(Arc<anyhow::Error>),

    /// The caller running the producer was dropped before it finished.
    #[error("Producer for key '{0}' was abandoned before completing")]
    ProducerAbandoned(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cache write-path errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("A user ID is required to cache consent-gated data for key '{0}'")]
    MissingUserId(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Consent ledger misuse errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsentError {
    #[error("A user ID is required for consent operations")]
    MissingUserId,

    #[error("At least one consent category must be given")]
    NoCategories,

    #[error("Unknown consent category: {0}")]
    UnknownCategory(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
