//! Google OAuth 2.0 identity provider.
//!
//! The authorization code flow with PKCE, redirecting to the bot's public
//! callback endpoint:
//!
//! 1. The broker generates a request key and a PKCE verifier
//! 2. [`GoogleIdentity::authorization_url`] embeds the key as `state`
//! 3. An operator grants access; Google redirects to `<site_root>/callback`
//! 4. The callback hands the code to the broker, which calls
//!    [`GoogleIdentity::exchange_code`] with the verifier

use tracing::{debug, info};

use crate::credentials::TokenInfo;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, IdentityProvider};

use super::config::GoogleConfig;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Issues and renews Google credentials.
#[derive(Debug)]
pub struct GoogleIdentity {
    config: GoogleConfig,
    http_client: reqwest::Client,
    token_url: String,
}

impl GoogleIdentity {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        let http_client = config.http_client()?;
        Ok(Self {
            config,
            http_client,
            token_url: GOOGLE_TOKEN_URL.to_string(),
        })
    }

    /// Sends token requests to another endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Posts a form to the token endpoint and decodes the response.
    async fn request_token(&self, params: &[(&str, &str)]) -> ProviderResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| google_error(ProviderError::network(format!("token request failed: {}", e))))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| google_error(ProviderError::network(format!("failed to read response: {}", e))))?;

        if !status.is_success() {
            // The token endpoint answers 400 for a bad or reused code.
            return Err(google_error(ProviderError::authentication(format!(
                "token request rejected ({}): {}",
                status, body
            ))));
        }

        parse_token_response(&body)
    }
}

impl IdentityProvider for GoogleIdentity {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> String {
        build_auth_url(&self.config, state, code_challenge)
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
        Box::pin(async move {
            let params = [
                ("client_id", self.config.credentials.client_id.as_str()),
                ("client_secret", self.config.credentials.client_secret.as_str()),
                ("code", code),
                ("code_verifier", code_verifier),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ];
            let response = self.request_token(&params).await?;

            info!("exchanged authorization code for tokens");
            let scopes = response
                .granted_scopes()
                .unwrap_or_else(|| self.config.scopes.clone());
            Ok(TokenInfo::new(
                response.access_token,
                response.refresh_token,
                response.expires_in,
                scopes,
            ))
        })
    }

    fn refresh<'a>(&'a self, token: &'a TokenInfo) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
        Box::pin(async move {
            let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
                google_error(ProviderError::authentication("no refresh token available"))
            })?;

            let params = [
                ("client_id", self.config.credentials.client_id.as_str()),
                ("client_secret", self.config.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ];
            let response = self.request_token(&params).await?;

            debug!("refreshed access token");
            Ok(token.refreshed(
                response.access_token,
                response.refresh_token,
                response.expires_in,
            ))
        })
    }
}

fn google_error(err: ProviderError) -> ProviderError {
    err.with_provider("google")
}

/// Builds the Google consent page URL.
fn build_auth_url(config: &GoogleConfig, state: &str, code_challenge: &str) -> String {
    let scope = config.scopes.join(" ");

    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
        code_challenge={}&code_challenge_method=S256&state={}&\
        access_type=offline&prompt=consent",
        GOOGLE_AUTH_URL,
        urlencoding::encode(&config.credentials.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(&scope),
        urlencoding::encode(code_challenge),
        urlencoding::encode(state),
    )
}

fn parse_token_response(body: &str) -> ProviderResult<TokenResponse> {
    serde_json::from_str(body).map_err(|e| {
        google_error(ProviderError::invalid_response(format!(
            "invalid token response: {}",
            e
        )))
    })
}

/// Response from Google's token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Space-separated granted scopes.
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn granted_scopes(&self) -> Option<Vec<String>> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
    }
}
