//! Server error types.

use std::io;

use calnotify_providers::ProviderError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reminder engine.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or invalid startup configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// An external collaborator failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// IO error (listener, file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The pending authorization was torn down before a code was accepted.
    #[error("Authorization request abandoned")]
    AuthAbandoned,

    /// The calendar refused the credential during a refresh cycle.
    #[error("Calendar rejected the credential")]
    CredentialRejected,
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            ServerError::config("no pairings").to_string(),
            "Configuration error: no pairings"
        );
        let provider: ServerError = ProviderError::network("timeout")
            .with_provider("google")
            .into();
        assert_eq!(provider.to_string(), "[google] network_error: timeout");
    }
}
