//! Bot configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/calnotify/config.toml` by default.
//!
//! Secret values (`client_id`, `client_secret`, the Slack `token`) support
//! secret references:
//! - `pass::path/in/store` resolved via `pass show`
//! - `env::VAR_NAME` resolved from the environment
//! - plain text used as-is

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use calnotify_core::ChannelCalendarPairing;
use calnotify_providers::FileCredentialStore;
use calnotify_providers::google::{GoogleConfig, OAuthCredentials};
use calnotify_server::ServerConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BotError, BotResult};
use crate::secret;

/// Environment variable overriding the HTTP port.
pub const PORT_ENV: &str = "PORT";

// ---------------------------------------------------------------------------
// BotConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the calnotify bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Channel receiving status messages and authorization prompts.
    pub admin_channel: String,

    /// Channels whose reminders mention everyone present.
    pub emphasize_channels: Vec<String>,

    /// Seconds between refresh cycles.
    pub refresh_interval_secs: u64,

    /// Channel/calendar pairings.
    pub pairs: Vec<ChannelCalendarPairing>,

    /// Callback listener settings.
    pub http: HttpSettings,

    /// Google Calendar settings.
    pub google: GoogleSettings,

    /// Slack settings.
    pub slack: SlackSettings,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            admin_channel: String::new(),
            emphasize_channels: Vec::new(),
            refresh_interval_secs: 30 * 60,
            pairs: Vec::new(),
            http: HttpSettings::default(),
            google: GoogleSettings::default(),
            slack: SlackSettings::default(),
        }
    }
}

/// Callback listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Address to bind.
    pub bind: IpAddr,

    /// Port to bind; the `PORT` environment variable takes precedence.
    pub port: u16,

    /// Public base URL; the callback is `<site_root>/callback`.
    pub site_root: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            site_root: None,
        }
    }
}

impl HttpSettings {
    /// Returns the bind address, preferring `port_override` when set.
    pub fn socket_addr(&self, port_override: Option<&str>) -> BotResult<SocketAddr> {
        let port = match port_override {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                BotError::config(format!("{} must be a port number, got `{}`", PORT_ENV, raw))
            })?,
            None => self.port,
        };
        Ok(SocketAddr::new(self.bind, port))
    }

    /// Returns the absolute URL of the authorization callback.
    pub fn callback_url(&self) -> BotResult<String> {
        let site_root = self
            .site_root
            .as_deref()
            .ok_or_else(|| BotError::config("[http] site_root is required"))?;

        let url = Url::parse(site_root)
            .map_err(|e| BotError::config(format!("invalid site_root `{}`: {}", site_root, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BotError::config(format!(
                "site_root must be an http(s) URL, got `{}`",
                site_root
            )));
        }

        Ok(format!("{}/callback", url.as_str().trim_end_matches('/')))
    }
}

impl BotConfig {
    /// Loads configuration from the default path, or defaults if absent.
    pub fn load() -> BotResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> BotResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BotError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> BotResult<Self> {
        toml::from_str(content).map_err(|e| BotError::config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calnotify")
    }

    /// Builds the engine configuration.
    ///
    /// `port_override` is the value of the `PORT` environment variable, if set.
    pub fn server_config(&self, port_override: Option<&str>) -> BotResult<ServerConfig> {
        let config = ServerConfig::new(self.pairs.clone(), self.admin_channel.clone())
            .with_emphasize_channels(self.emphasize_channels.iter().cloned())
            .with_refresh_interval(Duration::from_secs(self.refresh_interval_secs))
            .with_bind(self.http.socket_addr(port_override)?);
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without network access.
    pub fn validate(&self, port_override: Option<&str>) -> BotResult<()> {
        self.server_config(port_override)?;
        let callback_url = self.http.callback_url()?;
        self.google.provider_config(&callback_url)?;
        self.slack.resolve_token()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GoogleSettings
// ---------------------------------------------------------------------------

/// Google Calendar settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// Where the credential is persisted.
    pub token_path: Option<PathBuf>,
}

impl GoogleSettings {
    /// Resolves credentials and builds the provider configuration.
    pub fn provider_config(&self, redirect_uri: &str) -> BotResult<GoogleConfig> {
        let config = GoogleConfig::new(self.resolve_credentials()?, redirect_uri);
        config.validate().map_err(BotError::Config)?;
        Ok(config)
    }

    /// Resolves OAuth credentials from the inline fields.
    pub(crate) fn resolve_credentials(&self) -> BotResult<OAuthCredentials> {
        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            BotError::config(format!(
                "Google credentials not found. Add to {}:\n  \
                 [google]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                 client_secret = \"YOUR_SECRET\"",
                BotConfig::default_path().display()
            ))
        })?;
        let raw_secret = self.client_secret.as_deref().ok_or_else(|| {
            BotError::config("client_secret is missing from [google] section in config.toml")
        })?;

        Ok(OAuthCredentials::new(
            secret::resolve(raw_id)?,
            secret::resolve(raw_secret)?,
        ))
    }

    /// Returns the credential file location.
    pub fn token_path(&self) -> BotResult<PathBuf> {
        self.token_path
            .clone()
            .or_else(FileCredentialStore::default_path)
            .ok_or_else(|| {
                BotError::config("no data directory found; set [google] token_path")
            })
    }
}

// ---------------------------------------------------------------------------
// SlackSettings
// ---------------------------------------------------------------------------

/// Slack settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackSettings {
    /// Bot token (supports `pass::` and `env::` prefixes).
    pub token: Option<String>,
}

impl SlackSettings {
    pub fn resolve_token(&self) -> BotResult<String> {
        let raw = self
            .token
            .as_deref()
            .ok_or_else(|| BotError::config("[slack] token is required"))?;
        Ok(secret::resolve(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
admin_channel = "bot-admin"
emphasize_channels = ["bot-admin"]
refresh_interval_secs = 600

[[pairs]]
channel = "bot-admin"
calendar = "team@group.calendar.google.com"

[[pairs]]
channel = "eng"
calendar = "eng@group.calendar.google.com"

[http]
port = 8080
site_root = "https://bot.example.org/"

[google]
client_id = "toml-id.apps.googleusercontent.com"
client_secret = "toml-secret"
token_path = "/var/lib/calnotify/google-token.json"

[slack]
token = "xoxb-test"
"#;

    #[test]
    fn parses_full_config() {
        let config = BotConfig::parse(FULL).unwrap();
        assert_eq!(config.admin_channel, "bot-admin");
        assert_eq!(config.pairs.len(), 2);
        assert_eq!(config.pairs[1], ChannelCalendarPairing::new("eng", "eng@group.calendar.google.com"));
        assert_eq!(config.http.bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(
            config.google.token_path().unwrap(),
            PathBuf::from("/var/lib/calnotify/google-token.json")
        );
        assert!(config.validate(None).is_ok());
    }

    #[test]
    fn server_config_carries_settings() {
        let config = BotConfig::parse(FULL).unwrap();
        let server = config.server_config(None).unwrap();
        assert_eq!(server.refresh_interval, Duration::from_secs(600));
        assert_eq!(server.bind.port(), 8080);
        assert!(server.is_emphasized("bot-admin"));
        assert!(!server.is_emphasized("eng"));
    }

    #[test]
    fn port_override_wins() {
        let config = BotConfig::parse(FULL).unwrap();
        let server = config.server_config(Some("5000")).unwrap();
        assert_eq!(server.bind.port(), 5000);

        assert!(config.server_config(Some("http")).is_err());
    }

    #[test]
    fn defaults() {
        let config = BotConfig::default();
        assert_eq!(config.refresh_interval_secs, 1800);
        assert_eq!(config.http.port, 3000);
        assert!(config.http.site_root.is_none());
    }

    #[test]
    fn callback_url() {
        let mut http = HttpSettings {
            site_root: Some("https://bot.example.org".to_string()),
            ..HttpSettings::default()
        };
        assert_eq!(http.callback_url().unwrap(), "https://bot.example.org/callback");

        http.site_root = Some("https://example.org/bots/".to_string());
        assert_eq!(http.callback_url().unwrap(), "https://example.org/bots/callback");

        http.site_root = Some("not a url".to_string());
        assert!(http.callback_url().is_err());

        http.site_root = Some("ftp://example.org".to_string());
        assert!(http.callback_url().is_err());

        http.site_root = None;
        assert!(http.callback_url().is_err());
    }

    #[test]
    fn missing_pairs_is_a_config_error() {
        let config = BotConfig::parse("admin_channel = \"bot-admin\"\n").unwrap();
        let err = config.server_config(None).unwrap_err();
        assert!(err.to_string().contains("pairing"));
    }

    #[test]
    fn missing_slack_token_fails_validation() {
        let mut config = BotConfig::parse(FULL).unwrap();
        config.slack.token = None;
        assert!(config.validate(None).is_err());
    }

    #[test]
    fn resolve_credentials_env_prefix() {
        unsafe {
            std::env::set_var("_CALNOTIFY_TEST_CLIENT_ID", "env-id.apps.googleusercontent.com");
            std::env::set_var("_CALNOTIFY_TEST_CLIENT_SECRET", "env-secret");
        }

        let settings = GoogleSettings {
            client_id: Some("env::_CALNOTIFY_TEST_CLIENT_ID".to_string()),
            client_secret: Some("env::_CALNOTIFY_TEST_CLIENT_SECRET".to_string()),
            ..Default::default()
        };
        let creds = settings.resolve_credentials().unwrap();
        assert_eq!(creds.client_id, "env-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "env-secret");

        unsafe {
            std::env::remove_var("_CALNOTIFY_TEST_CLIENT_ID");
            std::env::remove_var("_CALNOTIFY_TEST_CLIENT_SECRET");
        }
    }

    #[test]
    fn resolve_credentials_missing_fields() {
        let only_secret = GoogleSettings {
            client_secret: Some("secret".to_string()),
            ..Default::default()
        };
        let err = only_secret.resolve_credentials().unwrap_err();
        assert!(err.to_string().contains("credentials not found"));

        let only_id = GoogleSettings {
            client_id: Some("id.apps.googleusercontent.com".to_string()),
            ..Default::default()
        };
        let err = only_id.resolve_credentials().unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, FULL).unwrap();

        let config = BotConfig::load_from(&path).unwrap();
        assert_eq!(config.slack.resolve_token().unwrap(), "xoxb-test");

        assert!(BotConfig::load_from(&dir.path().join("missing.toml")).is_err());
    }
}
