//! Config command implementations

use colored::Colorize;

use guardcache::error::Result;

use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::output::json;

/// Print the effective configuration with the secret redacted
pub fn show(opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;

    match opts.format {
        OutputFormat::Json => println!("{}", json::format_json(&config)?),
        OutputFormat::Pretty | OutputFormat::Table => {
            print!("{}", config.to_yaml()?);
            let secret = if config.cache.secret.is_some() {
                "configured".green()
            } else {
                "not set (random per-process key)".yellow()
            };
            println!("# encryption secret: {}", secret);
        }
    }
    Ok(())
}

/// Print the config file location and whether it exists
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let path = opts.config_path()?;

    match opts.format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": path.display().to_string(),
                "exists": path.exists(),
            });
            println!("{}", json::format_json(&output)?);
        }
        OutputFormat::Pretty | OutputFormat::Table => {
            println!("{}", path.display());
        }
    }
    Ok(())
}
