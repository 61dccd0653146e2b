//! Event types for channel reminders.
//!
//! This module provides the data model shared by the scheduling engine:
//! - [`ChannelCalendarPairing`]: A static association between a channel and a calendar
//! - [`CalendarEvent`]: An upcoming event with a concrete start instant
//! - [`EventIndex`]: Events grouped by channel, then start time, then event ID
//! - [`ReminderBatch`]: All events of one channel sharing one start time

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A static association between a notification channel and a calendar.
///
/// Pairings are loaded once from configuration and never change while the
/// process runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelCalendarPairing {
    /// Human-readable channel name (without the leading `#`).
    pub channel: String,
    /// External calendar identifier.
    pub calendar: String,
}

impl ChannelCalendarPairing {
    /// Creates a new pairing.
    pub fn new(channel: impl Into<String>, calendar: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            calendar: calendar.into(),
        }
    }
}

/// An upcoming calendar event with a concrete start instant.
///
/// All-day events never become a `CalendarEvent`: they carry no actionable
/// reminder time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Identifier, unique within its calendar.
    pub id: String,
    /// When the event starts.
    pub start_time: DateTime<Utc>,
    /// Link to the event in the calendar UI.
    pub display_link: Option<String>,
    /// Event title.
    pub title: Option<String>,
    /// Link to join the meeting, if any.
    pub join_link: Option<String>,
}

impl CalendarEvent {
    /// Creates a new event with the given ID and start time.
    pub fn new(id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start_time,
            display_link: None,
            title: None,
            join_link: None,
        }
    }

    /// Builder method to set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builder method to set the display link.
    pub fn with_display_link(mut self, link: impl Into<String>) -> Self {
        self.display_link = Some(link.into());
        self
    }

    /// Builder method to set the join link.
    pub fn with_join_link(mut self, link: impl Into<String>) -> Self {
        self.join_link = Some(link.into());
        self
    }
}

/// Events of one channel keyed by start time, then by event ID.
pub type ChannelEvents = BTreeMap<DateTime<Utc>, BTreeMap<String, CalendarEvent>>;

/// A three-level index: channel → start time → event ID → event.
///
/// The index is rebuilt from scratch on every refresh cycle. Inserting an
/// event whose `(channel, start_time, id)` is already present replaces the
/// previous entry, so duplicates across pairings collapse to one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventIndex {
    channels: BTreeMap<String, ChannelEvents>,
}

impl EventIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event for a channel.
    ///
    /// Returns the event previously stored under the same key, if any.
    pub fn insert(&mut self, channel: &str, event: CalendarEvent) -> Option<CalendarEvent> {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .entry(event.start_time)
            .or_default()
            .insert(event.id.clone(), event)
    }

    /// Returns the events indexed for a channel.
    pub fn channel(&self, channel: &str) -> Option<&ChannelEvents> {
        self.channels.get(channel)
    }

    /// Iterates over every `(channel, start_time)` group, ordered by channel
    /// name then start time.
    pub fn groups(&self) -> impl Iterator<Item = EventGroup<'_>> {
        self.channels.iter().flat_map(|(channel, by_time)| {
            by_time.iter().map(move |(start_time, events)| EventGroup {
                channel,
                start_time: *start_time,
                events,
            })
        })
    }

    /// Returns the number of `(channel, start_time)` groups.
    pub fn group_count(&self) -> usize {
        self.channels.values().map(BTreeMap::len).sum()
    }

    /// Returns the total number of indexed events.
    pub fn event_count(&self) -> usize {
        self.channels
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum()
    }

    /// Returns true if no events are indexed.
    pub fn is_empty(&self) -> bool {
        self.event_count() == 0
    }
}

/// A borrowed view of all events of one channel sharing one start time.
#[derive(Debug, Clone, Copy)]
pub struct EventGroup<'a> {
    /// The channel name.
    pub channel: &'a str,
    /// The shared start time.
    pub start_time: DateTime<Utc>,
    /// The events, keyed by ID.
    pub events: &'a BTreeMap<String, CalendarEvent>,
}

impl EventGroup<'_> {
    /// Clones the group into an owned batch.
    pub fn to_batch(&self) -> ReminderBatch {
        ReminderBatch {
            channel: self.channel.to_string(),
            start_time: self.start_time,
            events: self.events.values().cloned().collect(),
        }
    }
}

/// Co-scheduled events reported together in a single reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderBatch {
    /// Destination channel name.
    pub channel: String,
    /// Shared start time of every event in the batch.
    pub start_time: DateTime<Utc>,
    /// The events; never empty.
    pub events: Vec<CalendarEvent>,
}
