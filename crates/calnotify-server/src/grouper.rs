//! Event grouping across channel/calendar pairings.
//!
//! Each refresh cycle queries every pairing and folds the results into a
//! fresh [`EventIndex`]. A pairing whose query keeps failing is left out of
//! that cycle's index; the other pairings still contribute. A refused
//! credential stops the build, since no further query can succeed with it.

use std::sync::Arc;
use std::time::Duration;

use calnotify_core::{ChannelCalendarPairing, EventIndex};
use calnotify_providers::{CalendarSource, ProviderErrorCode, ProviderResult, RawEvent, TokenInfo};
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::config::DEFAULT_PAGE_SIZE;

/// Query and retry settings for the grouper.
#[derive(Debug, Clone)]
pub struct GrouperConfig {
    /// Maximum events fetched per pairing.
    pub page_size: usize,
    /// Extra attempts after a retryable failure.
    pub query_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Maximum delay between retries.
    pub max_backoff: Duration,
}

impl Default for GrouperConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            query_retries: 2,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl GrouperConfig {
    /// Builder: set page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Builder: set query retries.
    pub fn with_query_retries(mut self, retries: u32) -> Self {
        self.query_retries = retries;
        self
    }

    /// Calculates the delay before retry number `retry` (1-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let delay = base * self.backoff_multiplier.powi(retry as i32 - 1);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

/// Outcome of one index build.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// The index built from every pairing that answered.
    pub index: EventIndex,
    /// Pairings given up for this cycle.
    pub failed: Vec<ChannelCalendarPairing>,
    /// Events dropped for lacking an ID or a concrete start.
    pub skipped: usize,
    /// The calendar refused the credential; the index is incomplete.
    pub credential_rejected: bool,
}

impl BuildReport {
    /// Returns true if every pairing contributed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fans calendar queries out over the configured pairings.
pub struct EventGrouper {
    source: Arc<dyn CalendarSource>,
    config: GrouperConfig,
}

impl EventGrouper {
    pub fn new(source: Arc<dyn CalendarSource>, config: GrouperConfig) -> Self {
        Self { source, config }
    }

    /// Builds the index of upcoming events for `pairings`.
    ///
    /// Pairings are queried one after another. Several pairings may target
    /// the same channel; their events merge into one sub-index, and an event
    /// ID seen twice at the same start time is kept once.
    pub async fn build_index(
        &self,
        token: &TokenInfo,
        pairings: &[ChannelCalendarPairing],
        now: DateTime<Utc>,
    ) -> BuildReport {
        let mut report = BuildReport::default();

        for pairing in pairings {
            let events = match self.query(token, pairing, now).await {
                Ok(events) => events,
                Err(e) if e.code() == ProviderErrorCode::AuthenticationFailed => {
                    report.failed.push(pairing.clone());
                    report.credential_rejected = true;
                    break;
                }
                Err(_) => {
                    report.failed.push(pairing.clone());
                    continue;
                }
            };

            let fetched = events.len();
            for raw in events {
                match raw.into_calendar_event() {
                    Some(event) => {
                        report.index.insert(&pairing.channel, event);
                    }
                    None => report.skipped += 1,
                }
            }
            debug!(
                channel = %pairing.channel,
                calendar = %pairing.calendar,
                fetched,
                "queried calendar"
            );
        }

        report
    }

    /// Queries one pairing, retrying retryable failures with backoff.
    async fn query(
        &self,
        token: &TokenInfo,
        pairing: &ChannelCalendarPairing,
        now: DateTime<Utc>,
    ) -> ProviderResult<Vec<RawEvent>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .source
                .list_upcoming(token, &pairing.calendar, now, self.config.page_size)
                .await;

            match result {
                Ok(events) => return Ok(events),
                Err(e) if e.is_retryable() && attempt <= self.config.query_retries => {
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        channel = %pairing.channel,
                        calendar = %pairing.calendar,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "calendar query failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        channel = %pairing.channel,
                        calendar = %pairing.calendar,
                        attempt,
                        error = %e,
                        "calendar query failed, skipping pairing for this cycle"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use calnotify_providers::ProviderError;
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone};

    use super::*;
    use crate::testing::ScriptedSource;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()
    }

    fn token() -> TokenInfo {
        TokenInfo::new("access", None, None, vec![])
    }

    fn grouper(source: ScriptedSource) -> (EventGrouper, Arc<ScriptedSource>) {
        let source = Arc::new(source);
        (
            EventGrouper::new(source.clone(), GrouperConfig::default()),
            source,
        )
    }

    fn event(id: &str, minutes: i64) -> RawEvent {
        RawEvent::new(id, now() + ChronoDuration::minutes(minutes))
            .with_summary(id)
            .with_html_link(format!("https://calendar.example/{}", id))
    }

    #[test]
    fn backoff_delay() {
        let config = GrouperConfig::default();
        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn groups_by_channel_and_start_time() {
        let (grouper, source) = grouper(
            ScriptedSource::default()
                .answer("eng-cal", Ok(vec![event("a", 20), event("b", 20), event("c", 60)])),
        );
        let pairings = [ChannelCalendarPairing::new("eng", "eng-cal")];

        let report = grouper.build_index(&token(), &pairings, now()).await;

        assert!(report.is_complete());
        assert_eq!(report.index.group_count(), 2);
        assert_eq!(report.index.event_count(), 3);
        let first = report.index.groups().next().unwrap();
        assert_eq!(first.channel, "eng");
        assert_eq!(first.events.len(), 2);
        assert_eq!(source.calls.lock().unwrap()[0], ("eng-cal".to_string(), 20));
    }

    #[tokio::test]
    async fn skips_all_day_and_anonymous_events() {
        let all_day = RawEvent::all_day("holiday", NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        let no_id = RawEvent {
            id: None,
            ..event("x", 30)
        };
        let (grouper, _) = grouper(
            ScriptedSource::default().answer("cal", Ok(vec![all_day, no_id, event("ok", 30)])),
        );

        let report = grouper
            .build_index(&token(), &[ChannelCalendarPairing::new("eng", "cal")], now())
            .await;

        assert_eq!(report.index.event_count(), 1);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn pairings_sharing_a_channel_merge_and_dedup() {
        let (grouper, _) = grouper(
            ScriptedSource::default()
                .answer("team", Ok(vec![event("shared", 30), event("team-only", 30)]))
                .answer("all-hands", Ok(vec![event("shared", 30)])),
        );
        let pairings = [
            ChannelCalendarPairing::new("eng", "team"),
            ChannelCalendarPairing::new("eng", "all-hands"),
        ];

        let report = grouper.build_index(&token(), &pairings, now()).await;

        assert_eq!(report.index.group_count(), 1);
        assert_eq!(report.index.event_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_is_retried() {
        let (grouper, source) = grouper(
            ScriptedSource::default()
                .answer("cal", Err(ProviderError::network("connection reset")))
                .answer("cal", Ok(vec![event("a", 30)])),
        );

        let report = grouper
            .build_index(&token(), &[ChannelCalendarPairing::new("eng", "cal")], now())
            .await;

        assert!(report.is_complete());
        assert_eq!(report.index.event_count(), 1);
        assert_eq!(source.calls_for("cal"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_pairing_does_not_abort_cycle() {
        let (grouper, source) = grouper(
            ScriptedSource::default()
                .answer("broken", Err(ProviderError::server("backend error")))
                .answer("fine", Ok(vec![event("a", 30)])),
        );
        let pairings = [
            ChannelCalendarPairing::new("ops", "broken"),
            ChannelCalendarPairing::new("eng", "fine"),
        ];

        let report = grouper.build_index(&token(), &pairings, now()).await;

        assert_eq!(report.failed, vec![pairings[0].clone()]);
        assert_eq!(report.index.event_count(), 1);
        assert!(report.index.channel("eng").is_some());
        // One attempt plus the default two retries.
        assert_eq!(source.calls_for("broken"), 3);
    }

    #[tokio::test]
    async fn non_retryable_failure_is_not_retried() {
        let (grouper, source) = grouper(
            ScriptedSource::default().answer("cal", Err(ProviderError::not_found("no calendar"))),
        );

        let report = grouper
            .build_index(&token(), &[ChannelCalendarPairing::new("eng", "cal")], now())
            .await;

        assert!(!report.is_complete());
        assert!(report.index.is_empty());
        assert_eq!(source.calls_for("cal"), 1);
    }

    #[tokio::test]
    async fn refused_credential_stops_the_build() {
        let (grouper, source) = grouper(
            ScriptedSource::default()
                .answer("first", Err(ProviderError::authentication("HTTP 401")))
                .answer("second", Ok(vec![event("a", 30)])),
        );
        let pairings = [
            ChannelCalendarPairing::new("eng", "first"),
            ChannelCalendarPairing::new("ops", "second"),
        ];

        let report = grouper.build_index(&token(), &pairings, now()).await;

        assert!(report.credential_rejected);
        assert_eq!(report.failed, vec![pairings[0].clone()]);
        assert_eq!(source.calls_for("first"), 1);
        assert_eq!(source.calls_for("second"), 0);
    }
}
