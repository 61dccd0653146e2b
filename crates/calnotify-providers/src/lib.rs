//! External collaborators of the reminder engine.
//!
//! - [`CalendarSource`] - Upcoming events of one calendar
//! - [`IdentityProvider`] - Interactive authorization, code exchange, refresh
//! - [`CredentialStore`] - Durable holder for the one [`TokenInfo`]
//! - [`NotificationSink`] - Chat delivery of reminders and status texts
//! - [`ChannelDirectory`] - Channel name to channel id
//! - [`ProviderError`] - Error type shared by all of them
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Google Calendar  │   │ Google OAuth │   │  Slack API   │
//! └────────┬─────────┘   └──────┬───────┘   └──────┬───────┘
//!          │                    │                  │
//!          ▼                    ▼                  ▼
//! ┌──────────────────┐ ┌────────────────┐ ┌──────────────────┐
//! │ CalendarSource   │ │IdentityProvider│ │ NotificationSink │
//! └────────┬─────────┘ └────────────────┘ └──────────────────┘
//!          │
//!          ▼ into_calendar_event()
//!   ┌───────────────┐
//!   │ CalendarEvent │
//!   └───────────────┘
//! ```

pub mod credentials;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod pkce;
pub mod provider;
pub mod raw_event;
pub mod sink;
#[cfg(feature = "slack")]
pub mod slack;

pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore, TokenInfo};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use pkce::{PkceChallenge, generate_request_key, request_keys_match};
pub use provider::{BoxFuture, CalendarSource, IdentityProvider};
pub use raw_event::{RawEvent, RawEventTime};
pub use sink::{ChannelDirectory, NotificationSink};
