//! Raw event records as returned by a [`CalendarSource`].
//!
//! A [`RawEvent`] keeps every field optional: the calendar API may omit the
//! identifier or the start. [`RawEvent::into_calendar_event`] filters out
//! anything that cannot be scheduled.
//!
//! [`CalendarSource`]: crate::provider::CalendarSource

use calnotify_core::CalendarEvent;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The start time of a raw event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RawEventTime {
    /// A specific instant.
    DateTime(DateTime<Utc>),
    /// An all-day event date (no specific time).
    Date(NaiveDate),
}

impl RawEventTime {
    /// Returns true if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Returns the concrete instant, if this is not an all-day date.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::Date(_) => None,
        }
    }
}

/// An upcoming event as reported by the calendar source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Identifier, unique within its calendar.
    pub id: Option<String>,
    pub start: Option<RawEventTime>,
    /// Link to the event in the calendar UI.
    pub html_link: Option<String>,
    pub summary: Option<String>,
    /// Video meeting link.
    pub hangout_link: Option<String>,
    /// "confirmed", "tentative" or "cancelled".
    pub status: Option<String>,
}

impl RawEvent {
    /// Creates a raw event with an identifier and a concrete start.
    pub fn new(id: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            id: Some(id.into()),
            start: Some(RawEventTime::DateTime(start)),
            ..Self::default()
        }
    }

    /// Creates an all-day raw event.
    pub fn all_day(id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: Some(id.into()),
            start: Some(RawEventTime::Date(date)),
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_html_link(mut self, link: impl Into<String>) -> Self {
        self.html_link = Some(link.into());
        self
    }

    pub fn with_hangout_link(mut self, link: impl Into<String>) -> Self {
        self.hangout_link = Some(link.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Returns true if the event is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.eq_ignore_ascii_case("cancelled"))
    }

    /// Converts into a schedulable event.
    ///
    /// Returns `None` for events with no identifier, no start, or an all-day
    /// start.
    pub fn into_calendar_event(self) -> Option<CalendarEvent> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let start = self.start.as_ref().and_then(RawEventTime::instant)?;
        Some(CalendarEvent {
            id,
            start_time: start,
            display_link: self.html_link,
            title: self.summary,
            join_link: self.hangout_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_datetime() -> DateTime<Utc> {
        "2025-02-05T10:00:00Z".parse().unwrap()
    }

    fn sample_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 5).unwrap()
    }

    #[test]
    fn event_time_variants() {
        let dt = RawEventTime::DateTime(sample_datetime());
        assert!(!dt.is_all_day());
        assert_eq!(dt.instant(), Some(sample_datetime()));

        let date = RawEventTime::Date(sample_date());
        assert!(date.is_all_day());
        assert_eq!(date.instant(), None);
    }

    #[test]
    fn converts_with_all_fields() {
        let event = RawEvent::new("evt-123", sample_datetime())
            .with_summary("Team Meeting")
            .with_html_link("https://calendar.google.com/event?eid=123")
            .with_hangout_link("https://meet.google.com/abc-defg-hij")
            .into_calendar_event()
            .unwrap();

        assert_eq!(event.id, "evt-123");
        assert_eq!(event.start_time, sample_datetime());
        assert_eq!(event.title.as_deref(), Some("Team Meeting"));
        assert_eq!(
            event.join_link.as_deref(),
            Some("https://meet.google.com/abc-defg-hij")
        );
    }

    #[test]
    fn all_day_is_not_schedulable() {
        let event = RawEvent::all_day("evt-1", sample_date());
        assert!(event.into_calendar_event().is_none());
    }

    #[test]
    fn missing_id_or_start_is_not_schedulable() {
        let no_id = RawEvent {
            id: None,
            ..RawEvent::new("x", sample_datetime())
        };
        assert!(no_id.into_calendar_event().is_none());

        let empty_id = RawEvent::new("", sample_datetime());
        assert!(empty_id.into_calendar_event().is_none());

        let no_start = RawEvent {
            start: None,
            ..RawEvent::new("x", sample_datetime())
        };
        assert!(no_start.into_calendar_event().is_none());
    }

    #[test]
    fn cancelled_status() {
        let event = RawEvent::new("evt-1", sample_datetime()).with_status("Cancelled");
        assert!(event.is_cancelled());
        assert!(!RawEvent::new("evt-2", sample_datetime()).is_cancelled());
    }

    #[test]
    fn serde_tagged_start() {
        let event = RawEvent::all_day("evt-1", sample_date());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["start"]["type"], "Date");
        assert_eq!(json["start"]["value"], "2025-02-05");
    }
}
