//! Configuration commands.

use std::path::Path;

use crate::config::{BotConfig, PORT_ENV};
use crate::error::{BotError, BotResult};

const REDACTED: &str = "<redacted>";

/// Dump the current configuration to stdout, with inline secrets redacted.
pub fn dump(config: &BotConfig, path: &Path) -> BotResult<()> {
    let toml_str = toml::to_string_pretty(&redacted(config))
        .map_err(|e| BotError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &BotConfig) -> BotResult<()> {
    let port = std::env::var(PORT_ENV).ok();
    config.validate(port.as_deref())?;

    println!(
        "Configuration is valid: {} pairing(s), callback at {}.",
        config.pairs.len(),
        config.http.callback_url()?
    );
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: &Path) -> BotResult<()> {
    println!("config: {}", path.display());
    Ok(())
}

fn redacted(config: &BotConfig) -> BotConfig {
    let mut config = config.clone();
    for value in [
        &mut config.google.client_secret,
        &mut config.slack.token,
    ] {
        if let Some(v) = value
            && !v.starts_with("pass::")
            && !v.starts_with("env::")
        {
            *v = REDACTED.to_string();
        }
    }
    config
}
