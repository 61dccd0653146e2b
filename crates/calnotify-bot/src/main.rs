//! calnotify entry point.

use std::process::ExitCode;

use clap::Parser;

use calnotify_bot::cli::{Cli, Command, ConfigAction};
use calnotify_bot::commands;
use calnotify_bot::config::BotConfig;
use calnotify_bot::error::BotResult;
use calnotify_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::from_flags(cli.debug, cli.json_logs)) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> BotResult<()> {
    let path = cli.config.clone().unwrap_or_else(BotConfig::default_path);
    let config = match cli.config {
        Some(ref path) => BotConfig::load_from(path)?,
        None => BotConfig::load()?,
    };

    match cli.command {
        Command::Run => commands::run::run(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&path),
        },
    }
}
