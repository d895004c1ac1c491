//! guardcache CLI - inspect caching policy decisions

use clap::Parser;

mod cli;
mod models;
mod output;

use cli::{Cli, Commands, ConfigCommands, GlobalOptions};
use guardcache::error::Result;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Classify {
            domain,
            operation,
            input,
        } => cli::classify::run(&opts, &domain, &operation, input.as_deref()),
        Commands::Rules => cli::rules::run(&opts),
        Commands::Events => cli::events::run(&opts),
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => cli::config::show(&opts),
            ConfigCommands::Path => cli::config::path(&opts),
        },
    }
}
