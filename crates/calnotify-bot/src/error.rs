//! Bot error types.

use calnotify_providers::ProviderError;
use calnotify_server::ServerError;
use thiserror::Error;

use crate::secret::SecretError;

/// Result type for bot operations.
pub type BotResult<T> = Result<T, BotError>;

/// Errors that stop the bot.
#[derive(Debug, Error)]
pub enum BotError {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A secret reference could not be resolved.
    #[error("configuration error: {0}")]
    Secret(#[from] SecretError),

    /// The reminder engine failed.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A collaborator failed during startup.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
