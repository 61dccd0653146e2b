//! Reminder engine: authorization, grouping, timers.
//!
//! This crate provides the core of the calnotify bot:
//! - [`AuthBroker`]: one interactive authorization at a time, shared by every
//!   caller that needs a credential
//! - [`EventGrouper`]: per-cycle index of upcoming events by channel and
//!   start time
//! - [`NotificationScheduler`]: reminder timers at and before each start
//! - [`RefreshDriver`]: periodic refresh cycles with backoff
//! - [`callback`]: the HTTP endpoint receiving authorization codes
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use calnotify_server::{RefreshConfig, RefreshDriver, ReminderEngine};
//!
//! async fn drive(engine: Arc<ReminderEngine>) {
//!     let driver = RefreshDriver::new(RefreshConfig::default());
//!     driver
//!         .run(move || {
//!             let engine = engine.clone();
//!             async move { engine.run_cycle().await.map(|_| ()) }
//!         })
//!         .await;
//! }
//! ```

mod auth;
pub mod callback;
mod config;
mod engine;
mod error;
mod grouper;
mod refresh;
mod reminders;
mod signals;
#[cfg(test)]
mod testing;

pub use auth::{AuthBroker, AuthPrompter, ChannelPrompter, PendingRequest, SubmitOutcome};
pub use config::{DEFAULT_PAGE_SIZE, ServerConfig};
pub use engine::{Clock, CycleReport, ReminderEngine};
pub use error::{ServerError, ServerResult};
pub use grouper::{BuildReport, EventGrouper, GrouperConfig};
pub use refresh::{RefreshCommand, RefreshConfig, RefreshDriver, RefreshHandle, RefreshState};
pub use reminders::{
    ArmedTimer, MAX_TIMER_DELAY, NotificationScheduler, REMINDER_LEAD, ReminderDelivery,
    ReminderKind, reminder_delays,
};
pub use signals::{ShutdownSignal, SignalHandler};
