//! Single-flight interactive authorization.
//!
//! [`AuthBroker`] hands out the credential used for calendar queries. When
//! none is cached or stored it opens one authorization request, prompts an
//! operator with its URL and parks every caller on the same pending result
//! until [`AuthBroker::submit_code`] accepts a code for that request.
//!
//! ```text
//!            ensure_credential (nothing cached)
//!   NoRequest ─────────────────────────────────▶ Pending(key, url)
//!       ▲                                          │   ▲
//!       │      submit_code(key, code) accepted     │   │ mismatch / failed exchange
//!       └──────────────────────────────────────────┘   └──────┘
//! ```

use std::sync::Arc;

use calnotify_core::authorization_prompt;
use calnotify_providers::{
    BoxFuture, CredentialStore, IdentityProvider, NotificationSink, PkceChallenge, TokenInfo,
    generate_request_key, request_keys_match,
};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult};

/// Tells an operator that authorization is needed.
pub trait AuthPrompter: Send + Sync {
    /// Delivers the authorization URL. Failures are logged, not returned.
    fn prompt<'a>(&'a self, authorization_url: &'a str) -> BoxFuture<'a, ()>;
}

/// Posts the authorization prompt to a chat channel.
pub struct ChannelPrompter {
    sink: Arc<dyn NotificationSink>,
    channel_id: String,
}

impl ChannelPrompter {
    pub fn new(sink: Arc<dyn NotificationSink>, channel_id: impl Into<String>) -> Self {
        Self {
            sink,
            channel_id: channel_id.into(),
        }
    }
}

impl AuthPrompter for ChannelPrompter {
    fn prompt<'a>(&'a self, authorization_url: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let text = authorization_prompt(authorization_url);
            if let Err(e) = self.sink.post_text(&self.channel_id, &text).await {
                error!(channel = %self.channel_id, error = %e, "failed to post authorization prompt");
            }
        })
    }
}

/// Result of submitting an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The code was redeemed; the request is consumed.
    Accepted,
    /// No authorization request is pending.
    NoActiveRequest,
    /// The request key does not match the pending request.
    KeyMismatch,
    /// The identity provider rejected the code; the request stays pending.
    ExchangeFailed {
        /// URL of the still-pending request, for a retry.
        authorization_url: String,
    },
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Public view of the pending authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_key: String,
    pub authorization_url: String,
}

struct PendingAuth {
    request_key: String,
    authorization_url: String,
    code_verifier: String,
    result: watch::Sender<Option<TokenInfo>>,
}

#[derive(Default)]
struct BrokerState {
    cached: Option<TokenInfo>,
    active: Option<PendingAuth>,
    /// Access token the calendar refused; never handed out again.
    rejected: Option<String>,
    /// Access token whose renewal failed; never renewed again.
    refresh_failed: Option<String>,
}

/// What the broker can do with the credential it currently holds.
enum Credential {
    Usable(TokenInfo),
    Renewable(TokenInfo),
    Missing,
}

impl BrokerState {
    fn assess(&self) -> Credential {
        let Some(token) = self.cached.as_ref() else {
            return Credential::Missing;
        };
        let rejected = self.rejected.as_deref() == Some(token.access_token.as_str());
        if !rejected && !token.is_expired() {
            return Credential::Usable(token.clone());
        }
        let renewal_failed = self.refresh_failed.as_deref() == Some(token.access_token.as_str());
        if token.can_refresh() && !renewal_failed {
            Credential::Renewable(token.clone())
        } else {
            Credential::Missing
        }
    }

    fn accept(&mut self, token: TokenInfo) {
        self.cached = Some(token);
        self.rejected = None;
        self.refresh_failed = None;
    }
}

/// Owns the cached credential and the one pending authorization request.
pub struct AuthBroker {
    store: Arc<dyn CredentialStore>,
    identity: Arc<dyn IdentityProvider>,
    prompter: Arc<dyn AuthPrompter>,
    state: Mutex<BrokerState>,
    /// Held for the duration of a renewal so only one runs at a time.
    renewal: Mutex<()>,
}

impl AuthBroker {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        identity: Arc<dyn IdentityProvider>,
        prompter: Arc<dyn AuthPrompter>,
    ) -> Self {
        Self {
            store,
            identity,
            prompter,
            state: Mutex::new(BrokerState::default()),
            renewal: Mutex::new(()),
        }
    }

    /// Returns a usable credential, waiting for an operator if needed.
    ///
    /// The cached credential wins, then the stored one. An expired or
    /// rejected credential with a refresh token is renewed first, by one
    /// caller at a time and without blocking code submission. Otherwise the
    /// caller joins the pending authorization request, creating it if none
    /// exists; the prompt is sent on every call that ends up waiting.
    ///
    /// # Errors
    ///
    /// Fails if the credential store cannot be read, or with
    /// [`ServerError::AuthAbandoned`] if the pending request is dropped.
    pub async fn ensure_credential(&self) -> ServerResult<TokenInfo> {
        loop {
            match self.current().await? {
                Credential::Usable(token) => return Ok(token),
                Credential::Renewable(_) => {}
                Credential::Missing => return self.await_authorization().await,
            }

            // Renew outside the state lock; concurrent callers queue here
            // and find the renewed credential once it is cached.
            let _renewal = self.renewal.lock().await;
            let stale = match self.current().await? {
                Credential::Usable(token) => return Ok(token),
                Credential::Renewable(token) => token,
                Credential::Missing => continue,
            };
            debug!("renewing credential");

            match self.identity.refresh(&stale).await {
                Ok(renewed) => {
                    info!("refreshed credential");
                    self.state.lock().await.accept(renewed.clone());
                    self.persist(&renewed).await;
                    return Ok(renewed);
                }
                Err(e) => {
                    warn!(error = %e, "credential refresh failed, authorization required");
                    self.state.lock().await.refresh_failed = Some(stale.access_token);
                }
            }
        }
    }

    /// Marks `token` as refused by the calendar.
    ///
    /// The next [`ensure_credential`](Self::ensure_credential) renews it if it
    /// carries a refresh token and prompts for authorization otherwise.
    pub async fn invalidate(&self, token: &TokenInfo) {
        let mut state = self.state.lock().await;
        state.rejected = Some(token.access_token.clone());
        warn!("credential rejected by the calendar, it will be renewed");
    }

    /// Redeems an authorization code for the pending request.
    ///
    /// Never mutates the pending request unless the code is accepted.
    pub async fn submit_code(&self, request_key: &str, code: &str) -> SubmitOutcome {
        let (code_verifier, authorization_url) = {
            let state = self.state.lock().await;
            match state.active {
                None => {
                    warn!("authorization code submitted with no active request");
                    return SubmitOutcome::NoActiveRequest;
                }
                Some(ref pending) if !request_keys_match(&pending.request_key, request_key) => {
                    warn!("authorization code submitted with a mismatched request key");
                    return SubmitOutcome::KeyMismatch;
                }
                Some(ref pending) => (
                    pending.code_verifier.clone(),
                    pending.authorization_url.clone(),
                ),
            }
        };

        let token = match self.identity.exchange_code(code, &code_verifier).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "authorization code exchange failed");
                return SubmitOutcome::ExchangeFailed { authorization_url };
            }
        };

        let pending = {
            let mut state = self.state.lock().await;
            let Some(pending) = state
                .active
                .take_if(|p| request_keys_match(&p.request_key, request_key))
            else {
                // Another submission consumed the request while we exchanged.
                return SubmitOutcome::NoActiveRequest;
            };
            state.accept(token.clone());
            pending
        };

        pending.result.send_replace(Some(token.clone()));
        info!("authorization code accepted");
        self.persist(&token).await;
        SubmitOutcome::Accepted
    }

    /// Returns the pending authorization request, if any.
    pub async fn pending_request(&self) -> Option<PendingRequest> {
        self.state
            .lock()
            .await
            .active
            .as_ref()
            .map(|pending| PendingRequest {
                request_key: pending.request_key.clone(),
                authorization_url: pending.authorization_url.clone(),
            })
    }

    /// Drops the pending request; its waiters fail with
    /// [`ServerError::AuthAbandoned`].
    pub async fn abandon_pending(&self) {
        if self.state.lock().await.active.take().is_some() {
            info!("pending authorization request abandoned");
        }
    }

    fn open_request(&self) -> PendingAuth {
        let request_key = generate_request_key();
        let pkce = PkceChallenge::generate();
        let authorization_url = self.identity.authorization_url(&request_key, &pkce.challenge);
        let (result, _) = watch::channel(None);

        info!("opened authorization request");
        debug!(request_key = %request_key, "authorization request key");

        PendingAuth {
            request_key,
            authorization_url,
            code_verifier: pkce.verifier,
            result,
        }
    }

    /// Loads the stored credential if none is cached, then assesses it.
    async fn current(&self) -> ServerResult<Credential> {
        let mut state = self.state.lock().await;
        if state.cached.is_none() {
            state.cached = self.store.get().await?;
            if state.cached.is_some() {
                debug!("loaded credential from store");
            }
        }
        Ok(state.assess())
    }

    /// Joins the pending authorization request, opening one if needed, and
    /// waits for it to be accepted.
    async fn await_authorization(&self) -> ServerResult<TokenInfo> {
        let (mut result, authorization_url) = {
            let mut state = self.state.lock().await;
            // A code may have been accepted since the credential was assessed.
            if let Credential::Usable(token) = state.assess() {
                return Ok(token);
            }
            let pending = state.active.get_or_insert_with(|| self.open_request());
            (
                pending.result.subscribe(),
                pending.authorization_url.clone(),
            )
        };

        self.prompter.prompt(&authorization_url).await;

        let token = result
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ServerError::AuthAbandoned)?
            .clone();
        token.ok_or(ServerError::AuthAbandoned)
    }

    async fn persist(&self, token: &TokenInfo) {
        if let Err(e) = self.store.set(token.clone()).await {
            error!(error = %e, "failed to persist credential");
        }
    }
}
