//! Chat-side collaborators: message delivery and channel lookup.

use std::collections::HashMap;

use calnotify_core::ReminderBatch;

use crate::error::ProviderResult;
use crate::provider::BoxFuture;

/// Delivers messages to chat channels.
pub trait NotificationSink: Send + Sync {
    /// Posts a reminder for a batch of co-scheduled events.
    ///
    /// `emphasize` asks the sink to notify everyone present in the channel.
    fn post_reminder<'a>(
        &'a self,
        channel_id: &'a str,
        batch: &'a ReminderBatch,
        emphasize: bool,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Posts a plain status or prompt text.
    fn post_text<'a>(&'a self, channel_id: &'a str, text: &'a str)
    -> BoxFuture<'a, ProviderResult<()>>;
}

/// Channel name to channel identifier mapping, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDirectory {
    ids: HashMap<String, String>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel. A leading `#` on the name is ignored.
    pub fn insert(&mut self, name: impl AsRef<str>, id: impl Into<String>) {
        self.ids.insert(normalize(name.as_ref()).to_string(), id.into());
    }

    /// Resolves a channel name to its identifier.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.ids.get(normalize(name)).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<N: AsRef<str>, I: Into<String>> FromIterator<(N, I)> for ChannelDirectory {
    fn from_iter<T: IntoIterator<Item = (N, I)>>(iter: T) -> Self {
        let mut directory = Self::new();
        for (name, id) in iter {
            directory.insert(name, id);
        }
        directory
    }
}

fn normalize(name: &str) -> &str {
    name.strip_prefix('#').unwrap_or(name)
}
