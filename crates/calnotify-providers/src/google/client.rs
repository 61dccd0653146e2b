//! Google Calendar API v3 event source.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::credentials::TokenInfo;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, CalendarSource};
use crate::raw_event::{RawEvent, RawEventTime};

use super::config::GoogleConfig;

/// Base URL for Google Calendar API v3.
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Lists upcoming events through the Google Calendar API.
#[derive(Debug)]
pub struct GoogleCalendarSource {
    http_client: reqwest::Client,
    base_url: String,
}

impl GoogleCalendarSource {
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        Ok(Self {
            http_client: config.http_client()?,
            base_url: CALENDAR_API_BASE.to_string(),
        })
    }

    /// Points the source at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch(
        &self,
        token: &TokenInfo,
        calendar_id: &str,
        not_before: DateTime<Utc>,
        max_results: usize,
    ) -> ProviderResult<Vec<RawEvent>> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token.access_token)
            .query(&[
                ("timeMin", not_before.to_rfc3339()),
                ("maxResults", max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                let err = if e.is_timeout() {
                    ProviderError::network("request timeout")
                } else if e.is_connect() {
                    ProviderError::network(format!("connection failed: {}", e))
                } else {
                    ProviderError::network(format!("request failed: {}", e))
                };
                err.with_provider("google")
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(ProviderError::rate_limited(format!(
                "rate limit exceeded{}",
                retry_after
                    .map(|s| format!(", retry after {} seconds", s))
                    .unwrap_or_default()
            ))
            .with_provider("google"));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(
                ProviderError::authentication("access token expired or invalid")
                    .with_provider("google"),
            );
        }

        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::authorization(format!(
                "access denied to calendar {}",
                calendar_id
            ))
            .with_provider("google"));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::server(format!("API error ({}): {}", status, body))
                .with_provider("google"));
        }

        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_provider("google")
        })?;

        let events = parse_event_list(&body)?;
        debug!(calendar = %calendar_id, count = events.len(), "fetched events");
        Ok(events)
    }
}

impl CalendarSource for GoogleCalendarSource {
    fn name(&self) -> &str {
        "google"
    }

    fn list_upcoming<'a>(
        &'a self,
        token: &'a TokenInfo,
        calendar_id: &'a str,
        not_before: DateTime<Utc>,
        max_results: usize,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
        Box::pin(self.fetch(token, calendar_id, not_before, max_results))
    }
}

/// Parses an `events.list` body, dropping cancelled events.
fn parse_event_list(body: &str) -> ProviderResult<Vec<RawEvent>> {
    let list: EventListResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse response: {}", e))
            .with_provider("google")
    })?;

    Ok(list.items.into_iter().filter_map(convert_event).collect())
}

fn convert_event(event: ApiEvent) -> Option<RawEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let start = event.start.and_then(|start| match (start.date_time, start.date) {
        (Some(dt), _) => DateTime::parse_from_rfc3339(&dt)
            .map_err(|e| warn!(event = ?event.id, "failed to parse start time: {}", e))
            .ok()
            .map(|parsed| RawEventTime::DateTime(parsed.with_timezone(&Utc))),
        (None, Some(date)) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| warn!(event = ?event.id, "failed to parse start date: {}", e))
            .ok()
            .map(RawEventTime::Date),
        (None, None) => None,
    });

    Some(RawEvent {
        id: event.id,
        start,
        html_link: event.html_link,
        summary: event.summary,
        hangout_link: event.hangout_link,
        status: event.status,
    })
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
}

/// A single event from the Google Calendar API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    start: Option<ApiEventTime>,
    html_link: Option<String>,
    hangout_link: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}
