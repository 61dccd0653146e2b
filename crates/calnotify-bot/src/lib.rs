//! CLI, configuration and startup wiring for the calnotify bot.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use config::BotConfig;
pub use error::{BotError, BotResult};
