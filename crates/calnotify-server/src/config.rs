//! Engine configuration.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use calnotify_core::ChannelCalendarPairing;

use crate::error::{ServerError, ServerResult};
use crate::grouper::GrouperConfig;
use crate::refresh::RefreshConfig;

/// Fixed page size of every calendar query.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Engine configuration, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Channel/calendar pairings to watch.
    pub pairings: Vec<ChannelCalendarPairing>,

    /// Channel receiving status messages and authorization prompts.
    pub admin_channel: String,

    /// Channels whose reminders mention everyone present.
    pub emphasize_channels: HashSet<String>,

    /// Time between refresh cycles.
    pub refresh_interval: Duration,

    /// Extra attempts for a failed calendar query within one cycle.
    pub query_retries: u32,

    /// Maximum events fetched per pairing.
    pub page_size: usize,

    /// Address of the callback HTTP listener.
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            pairings: Vec::new(),
            admin_channel: String::new(),
            emphasize_channels: HashSet::new(),
            refresh_interval: Duration::from_secs(30 * 60),
            query_retries: 2,
            page_size: DEFAULT_PAGE_SIZE,
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration for the given pairings and admin channel.
    pub fn new(pairings: Vec<ChannelCalendarPairing>, admin_channel: impl Into<String>) -> Self {
        Self {
            pairings,
            admin_channel: admin_channel.into(),
            ..Default::default()
        }
    }

    /// Builder: set channels to emphasize.
    pub fn with_emphasize_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emphasize_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Builder: set query retries.
    pub fn with_query_retries(mut self, retries: u32) -> Self {
        self.query_retries = retries;
        self
    }

    /// Builder: set listener address.
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> ServerResult<()> {
        if self.pairings.is_empty() {
            return Err(ServerError::config("at least one channel/calendar pairing is required"));
        }
        if let Some(pairing) = self
            .pairings
            .iter()
            .find(|p| p.channel.trim().is_empty() || p.calendar.trim().is_empty())
        {
            return Err(ServerError::config(format!(
                "pairing has an empty channel or calendar: {:?}",
                pairing
            )));
        }
        if self.admin_channel.trim().is_empty() {
            return Err(ServerError::config("admin channel is required"));
        }
        if self.refresh_interval < Duration::from_secs(1) {
            return Err(ServerError::config("refresh interval must be at least one second"));
        }
        if self.page_size == 0 {
            return Err(ServerError::config("page size must be positive"));
        }
        Ok(())
    }

    /// Returns true if reminders for `channel` mention everyone.
    pub fn is_emphasized(&self, channel: &str) -> bool {
        self.emphasize_channels.contains(channel)
    }

    pub fn grouper_config(&self) -> GrouperConfig {
        GrouperConfig::default()
            .with_page_size(self.page_size)
            .with_query_retries(self.query_retries)
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig::new(self.refresh_interval)
    }
}
