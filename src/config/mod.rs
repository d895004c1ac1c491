//! Configuration management for guardcache

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::{CacheSettings, InvalidationSettings};
use crate::classify::ClassifierSettings;
use crate::consent::ConsentSettings;
use crate::error::{ConfigError, Result};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "GUARDCACHE_CONFIG";

/// Environment variable holding the encryption secret
pub const SECRET_ENV: &str = "GUARDCACHE_SECRET";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Capacity, TTL fallback and encryption secret
    #[serde(default)]
    pub cache: CacheSettings,

    /// TTL tiers, financial domains and domain overrides
    #[serde(default)]
    pub classifier: ClassifierSettings,

    #[serde(default)]
    pub consent: ConsentSettings,

    /// Extra domain event rules
    #[serde(default)]
    pub invalidation: InvalidationSettings,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".guardcache").join("config.yaml"))
    }

    /// Resolve and load configuration.
    ///
    /// An explicit path must exist. Without one, a missing file at the
    /// default location yields the built-in defaults. The secret is taken
    /// from the environment when set.
    pub fn load_at(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::load_from(&path)?
                } else {
                    log::debug!("No config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        if let Ok(secret) = std::env::var(SECRET_ENV)
            && !secret.is_empty()
        {
            config.cache.secret = Some(secret);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(contents).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Serialize for display; the secret is never written out
    pub fn to_yaml(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(self).map_err(ConfigError::from)?;
        Ok(yaml)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be > 0".to_string()).into());
        }
        if self.cache.max_bytes == 0 {
            return Err(ConfigError::Invalid("cache.max_bytes must be > 0".to_string()).into());
        }
        if self.cache.max_key_len == 0 {
            return Err(ConfigError::Invalid("cache.max_key_len must be > 0".to_string()).into());
        }
        if self.consent.max_history_per_user == 0 {
            return Err(ConfigError::Invalid(
                "consent.max_history_per_user must be > 0".to_string(),
            )
            .into());
        }
        if let Some(ov) = self
            .classifier
            .overrides
            .iter()
            .find(|o| o.domain.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "classifier override with empty domain (operation: {})",
                ov.operation.as_deref().unwrap_or("any")
            ))
            .into());
        }
        if let Some(rule) = self
            .invalidation
            .rules
            .iter()
            .find(|r| r.domain.trim().is_empty() || r.event.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "invalidation rule needs a domain and an event (got '{}'/'{}')",
                rule.domain, rule.event
            ))
            .into());
        }
        Ok(())
    }
}
