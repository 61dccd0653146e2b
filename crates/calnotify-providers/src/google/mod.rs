//! Google Calendar and Google OAuth 2.0.
//!
//! - [`GoogleIdentity`] builds the consent URL, redeems authorization codes
//!   and refreshes access tokens
//! - [`GoogleCalendarSource`] lists upcoming events of a calendar
//!
//! # Example
//!
//! ```ignore
//! use calnotify_providers::google::{GoogleCalendarSource, GoogleConfig, GoogleIdentity, OAuthCredentials};
//!
//! let config = GoogleConfig::new(
//!     OAuthCredentials::new(client_id, client_secret),
//!     "https://bot.example.org/callback",
//! );
//! let identity = GoogleIdentity::new(config.clone())?;
//! let source = GoogleCalendarSource::new(&config)?;
//! ```

mod client;
mod config;
mod oauth;

pub use client::GoogleCalendarSource;
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::GoogleIdentity;
