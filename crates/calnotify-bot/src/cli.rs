//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// calnotify - Calendar reminders in your chat channels
#[derive(Debug, Parser)]
#[command(name = "calnotify")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALNOTIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the bot in the foreground
    Run,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_flags() {
        let cli = Cli::try_parse_from(["calnotify", "--debug", "--json-logs", "run"]).unwrap();
        assert!(cli.debug);
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Command::Run));
    }

    #[test]
    fn parses_config_actions() {
        let cli =
            Cli::try_parse_from(["calnotify", "-c", "/tmp/bot.toml", "config", "validate"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bot.toml")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Validate
            }
        ));
    }

    #[test]
    fn command_is_required() {
        assert!(Cli::try_parse_from(["calnotify"]).is_err());
    }
}
