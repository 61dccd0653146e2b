//! Calendar and identity provider traits.
//!
//! [`CalendarSource`] yields upcoming events for one calendar;
//! [`IdentityProvider`] turns an interactive authorization into a
//! [`TokenInfo`] and renews it when it expires.
//!
//! Both traits return [`BoxFuture`]s so they stay object-safe and can be held
//! as `Arc<dyn CalendarSource>` by the server.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::credentials::TokenInfo;
use crate::error::ProviderResult;
use crate::raw_event::RawEvent;

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A source of upcoming calendar events.
///
/// # Example Implementation
///
/// ```ignore
/// impl CalendarSource for GoogleCalendarSource {
///     fn name(&self) -> &str { "google" }
///
///     fn list_upcoming<'a>(
///         &'a self,
///         token: &'a TokenInfo,
///         calendar_id: &'a str,
///         not_before: DateTime<Utc>,
///         max_results: usize,
///     ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
///         Box::pin(async move { self.fetch(token, calendar_id, not_before, max_results).await })
///     }
/// }
/// ```
pub trait CalendarSource: Send + Sync {
    /// Returns the name of this source (e.g. "google").
    fn name(&self) -> &str;

    /// Lists events of `calendar_id` starting at or after `not_before`.
    ///
    /// At most `max_results` events are returned. Cancelled events are never
    /// returned; all-day events are, with a [`RawEventTime::Date`] start.
    ///
    /// [`RawEventTime::Date`]: crate::raw_event::RawEventTime::Date
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on network errors, rejected credentials,
    /// rate limiting or unparseable responses.
    fn list_upcoming<'a>(
        &'a self,
        token: &'a TokenInfo,
        calendar_id: &'a str,
        not_before: DateTime<Utc>,
        max_results: usize,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>>;
}

/// An external identity provider issuing credentials.
pub trait IdentityProvider: Send + Sync {
    /// Builds the URL an operator opens to grant access.
    ///
    /// `state` is echoed back on the callback unchanged; `code_challenge` is
    /// the PKCE S256 challenge matching the verifier later passed to
    /// [`exchange_code`](Self::exchange_code).
    fn authorization_url(&self, state: &str, code_challenge: &str) -> String;

    /// Redeems an authorization code for a credential.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenInfo>>;

    /// Renews an expired credential using its refresh token.
    ///
    /// The returned credential keeps the original refresh token when the
    /// provider does not issue a new one.
    fn refresh<'a>(&'a self, token: &'a TokenInfo) -> BoxFuture<'a, ProviderResult<TokenInfo>>;
}
