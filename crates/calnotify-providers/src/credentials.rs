//! Credentials and their persistence.
//!
//! The credential is an OAuth token set ([`TokenInfo`]). A
//! [`CredentialStore`] holds at most one of them across restarts.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// Seconds shaved off the reported lifetime so tokens are renewed early.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// An OAuth token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token for obtaining new access tokens.
    pub refresh_token: Option<String>,

    /// When the access token expires.
    pub expires_at: Option<DateTime<Utc>>,

    /// The OAuth scopes that were granted.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the tokens were issued or last refreshed.
    pub last_refresh: DateTime<Utc>,
}

impl TokenInfo {
    /// Creates a token set from a token endpoint response.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(|secs| expiry_from(now, secs)),
            scopes,
            last_refresh: now,
        }
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns true if the access token is expired at `now`.
    ///
    /// Tokens without a known expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Returns true if the token can be renewed without operator action.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Returns the renewed token set after a refresh.
    ///
    /// The refresh token is kept unless the provider rotated it.
    pub fn refreshed(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            expires_at: expires_in_secs.map(|secs| expiry_from(now, secs)),
            scopes: self.scopes.clone(),
            last_refresh: now,
        }
    }
}

fn expiry_from(now: DateTime<Utc>, expires_in_secs: i64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in_secs) - Duration::seconds(EXPIRY_BUFFER_SECS)
}

/// Durable holder for one credential.
pub trait CredentialStore: Send + Sync {
    /// Returns the stored credential, or `None` if none was ever stored.
    fn get(&self) -> BoxFuture<'_, ProviderResult<Option<TokenInfo>>>;

    /// Stores a credential, replacing any previous one.
    fn set(&self, token: TokenInfo) -> BoxFuture<'_, ProviderResult<()>>;
}

/// A process-local store, used in tests and when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<TokenInfo>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding a credential.
    pub fn with_token(token: TokenInfo) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    fn lock(&self) -> ProviderResult<std::sync::MutexGuard<'_, Option<TokenInfo>>> {
        self.token
            .lock()
            .map_err(|_| ProviderError::internal("credential store lock poisoned").with_provider("store"))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> BoxFuture<'_, ProviderResult<Option<TokenInfo>>> {
        let result = self.lock().map(|token| token.clone());
        Box::pin(async move { result })
    }

    fn set(&self, token: TokenInfo) -> BoxFuture<'_, ProviderResult<()>> {
        let result = self.lock().map(|mut slot| {
            *slot = Some(token);
        });
        Box::pin(async move { result })
    }
}

/// Stores the credential as a JSON file.
///
/// Writes go to a temporary file that is then renamed over the target, and
/// the file is made readable by its owner only.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `<data dir>/calnotify/google-token.json`.
    #[cfg(feature = "google")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("calnotify").join("google-token.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ProviderResult<Option<TokenInfo>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no credential file");
                return Ok(None);
            }
            Err(e) => {
                return Err(store_error("failed to read credential file", e));
            }
        };

        let token: TokenInfo = serde_json::from_str(&content)
            .map_err(|e| store_error("failed to parse credential file", e))?;
        debug!(path = %self.path.display(), "loaded credential");
        Ok(Some(token))
    }

    async fn save(&self, token: &TokenInfo) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_error("failed to create credential directory", e))?;
        }

        let content = serde_json::to_string_pretty(token)
            .map_err(|e| store_error("failed to serialize credential", e))?;

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| store_error("failed to write credential file", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| store_error("failed to restrict credential file", e))?;
        }

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| store_error("failed to rename credential file", e))?;

        info!(path = %self.path.display(), "saved credential");
        Ok(())
    }
}

fn store_error<E>(context: &str, err: E) -> ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ProviderError::internal(format!("{}: {}", context, err))
        .with_provider("store")
        .with_source(err)
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> BoxFuture<'_, ProviderResult<Option<TokenInfo>>> {
        Box::pin(self.load())
    }

    fn set(&self, token: TokenInfo) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move { self.save(&token).await })
    }
}
