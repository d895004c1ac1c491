//! guardcache - a security-aware in-memory cache
//!
//! Every value offered to the cache is classified first. Credentials are
//! never stored, sensitive data is encrypted with AES-256-GCM and served only
//! to its owner while they hold consent for its category, and every entry
//! carries a TTL chosen by its sensitivity tier.
//!
//! ```no_run
//! use guardcache::cache::{AccessContext, CacheEngine, SetOptions};
//! use guardcache::config::Config;
//!
//! let engine = CacheEngine::from_config(&Config::default());
//! let opts = SetOptions::new("weather", "forecast");
//! engine.set("oslo", &serde_json::json!({"temp": 4}), &opts)?;
//! assert!(engine.get("oslo", &AccessContext::anonymous()).is_some());
//! # Ok::<(), guardcache::error::Error>(())
//! ```
//!
//! All state, including consent records, lives in process memory and is
//! lost when the process exits.

pub mod cache;
pub mod classify;
pub mod clock;
pub mod config;
pub mod consent;
pub mod error;

pub use cache::{AccessContext, CacheEngine, SetOptions};
pub use error::{Error, Result};
