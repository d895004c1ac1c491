//! Global CLI options shared across all commands

use std::path::{Path, PathBuf};

use guardcache::config::Config;
use guardcache::error::Result;

use crate::cli::{Cli, OutputFormat};

/// Global CLI options passed to all command handlers.
///
/// Precedence is CLI flag > environment variable > config file > default.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Output format (pretty, table, json)
    pub format: OutputFormat,

    /// Custom config file path (defaults to ~/.guardcache/config.yaml)
    pub config: Option<PathBuf>,
}

impl GlobalOptions {
    /// Create GlobalOptions from a parsed CLI struct.
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            format: cli.format,
            config: cli.config.clone(),
        }
    }

    /// Get config path as `Option<&Path>`.
    pub fn config_ref(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    /// Config file location in effect
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Config::default_path(),
        }
    }

    /// Load the effective configuration
    pub fn load_config(&self) -> Result<Config> {
        Config::load_at(self.config_ref())
    }
}
