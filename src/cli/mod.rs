//! CLI command definitions and handlers

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod args;
pub mod classify;
pub mod config;
pub mod events;
pub mod rules;

pub use args::{GlobalOptions, OutputFormat};

/// guardcache - inspect the caching policy of a security-aware cache
#[derive(Parser, Debug)]
#[command(name = "guardcache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "GUARDCACHE_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "GUARDCACHE_CONFIG", hide_env = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, env = "GUARDCACHE_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a JSON document and show the caching decision
    Classify {
        /// Domain the document was produced in
        #[arg(long, short = 'd', default_value = "")]
        domain: String,

        /// Operation that produced the document
        #[arg(long, short = 'o', default_value = "")]
        operation: String,

        /// JSON file to read; stdin when omitted or "-"
        input: Option<PathBuf>,
    },

    /// Show the marker rule table and domain overrides
    Rules,

    /// Show the domain event invalidation table
    Events,

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration (secret redacted)
    Show,

    /// Print the config file location
    Path,
}
