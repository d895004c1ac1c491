//! Security-aware in-memory cache
//!
//! Values are classified before they are stored: secrets are refused,
//! sensitive data is encrypted and consent-gated, and every entry carries a
//! TTL. Capacity is bounded by entry count and bytes with synchronous LRU
//! eviction. Nothing is persisted; all state is lost when the process exits.

pub mod crypto;
pub mod engine;
pub mod flight;
pub mod invalidation;
pub mod key;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTL configuration per sensitivity tier
///
/// These constants are the defaults for [`crate::classify::ClassifierSettings`]
/// and [`CacheSettings`].
pub struct CacheTtl;

impl CacheTtl {
    // No markers - reference data, catalog listings
    pub const PUBLIC: Duration = Duration::from_secs(60 * 60); // 1 hr

    // Contact details, location
    pub const PERSONAL: Duration = Duration::from_secs(30 * 60); // 30 min

    // Balances, transactions, health data - minutes, never hours
    pub const SENSITIVE_CEILING: Duration = Duration::from_secs(5 * 60); // 5 min

    // Fallback when neither caller nor classifier gives a TTL
    pub const DEFAULT: Duration = Duration::from_secs(10 * 60); // 10 min

    // Background expiry sweep cadence
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60); // 1 min
}

/// Capacity and lifecycle settings for the cache engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,

    /// Secret material the encryption key is derived from.
    /// A random per-process key is used when absent.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
}

fn default_max_entries() -> usize {
    1000
}

fn default_max_bytes() -> usize {
    50 * 1024 * 1024 // 50MB
}

fn default_ttl_secs() -> u64 {
    CacheTtl::DEFAULT.as_secs()
}

fn default_sweep_interval_secs() -> u64 {
    CacheTtl::SWEEP_INTERVAL.as_secs()
}

fn default_max_key_len() -> usize {
    512
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_key_len: default_max_key_len(),
            secret: None,
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// Re-export main types
pub use engine::{
    AccessContext, CacheEngine, CacheStats, ClearFilter, EventContext, SetOptions,
};
pub use invalidation::{InvalidationRule, InvalidationSettings, InvalidationTable};
pub use key::cache_key;
pub use storage::{CacheStorage, EntryMetadata};
