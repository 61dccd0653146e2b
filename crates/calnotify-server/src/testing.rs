//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use calnotify_core::ReminderBatch;
use calnotify_providers::{
    BoxFuture, CalendarSource, IdentityProvider, NotificationSink, ProviderError, ProviderResult,
    RawEvent, TokenInfo,
};
use chrono::{DateTime, Utc};

use crate::auth::AuthPrompter;

/// Lets spawned tasks run up to their next suspension point.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn token(access: &str) -> TokenInfo {
    TokenInfo::new(access, Some("refresh".to_string()), Some(3600), vec![])
}

/// Accepts the code "good", rejects everything else. Refreshes take
/// `refresh_delay` of tokio time.
#[derive(Default)]
pub struct FakeIdentity {
    pub exchanges: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub refresh_fails: bool,
    pub refresh_delay: Duration,
    pub verifiers: Mutex<Vec<String>>,
}

impl FakeIdentity {
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for FakeIdentity {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "https://auth.example/?state={}&challenge={}",
            state, code_challenge
        )
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.verifiers
            .lock()
            .unwrap()
            .push(code_verifier.to_string());
        let result = if code == "good" {
            Ok(token(&format!("access-{}", n)))
        } else {
            Err(ProviderError::authentication("invalid_grant"))
        };
        Box::pin(async move { result })
    }

    fn refresh<'a>(&'a self, token: &'a TokenInfo) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let result = if self.refresh_fails {
            Err(ProviderError::authentication("refresh token revoked"))
        } else {
            Ok(token.refreshed("renewed", None, Some(3600)))
        };
        let delay = self.refresh_delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

#[derive(Default)]
pub struct RecordingPrompter {
    pub urls: Mutex<Vec<String>>,
}

impl RecordingPrompter {
    pub fn prompts(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl AuthPrompter for RecordingPrompter {
    fn prompt<'a>(&'a self, authorization_url: &'a str) -> BoxFuture<'a, ()> {
        self.urls
            .lock()
            .unwrap()
            .push(authorization_url.to_string());
        Box::pin(async {})
    }
}

/// Records every post; fails them all when `fail` is set.
#[derive(Default)]
pub struct RecordingSink {
    pub reminders: Mutex<Vec<(String, ReminderBatch, bool)>>,
    pub texts: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reminder_count(&self) -> usize {
        self.reminders.lock().unwrap().len()
    }

    fn outcome(&self) -> ProviderResult<()> {
        if self.fail {
            Err(ProviderError::server("channel_archived"))
        } else {
            Ok(())
        }
    }
}

impl NotificationSink for RecordingSink {
    fn post_reminder<'a>(
        &'a self,
        channel_id: &'a str,
        batch: &'a ReminderBatch,
        emphasize: bool,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        self.reminders
            .lock()
            .unwrap()
            .push((channel_id.to_string(), batch.clone(), emphasize));
        let result = self.outcome();
        Box::pin(async move { result })
    }

    fn post_text<'a>(
        &'a self,
        channel_id: &'a str,
        text: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        self.texts
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        let result = self.outcome();
        Box::pin(async move { result })
    }
}

/// Takes `delay` of tokio time to post each reminder.
pub struct SlowSink {
    pub delay: Duration,
    pub started: AtomicUsize,
    pub completed: AtomicUsize,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }
}

impl NotificationSink for SlowSink {
    fn post_reminder<'a>(
        &'a self,
        _channel_id: &'a str,
        _batch: &'a ReminderBatch,
        _emphasize: bool,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn post_text<'a>(
        &'a self,
        _channel_id: &'a str,
        _text: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Answers each calendar from a queue of scripted results; the last result
/// repeats. Unscripted calendars are empty.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<HashMap<String, VecDeque<ProviderResult<Vec<RawEvent>>>>>,
    pub calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedSource {
    pub fn answer(self, calendar: &str, result: ProviderResult<Vec<RawEvent>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(calendar.to_string())
            .or_default()
            .push_back(result);
        self
    }

    pub fn calls_for(&self, calendar: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == calendar)
            .count()
    }
}

impl CalendarSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn list_upcoming<'a>(
        &'a self,
        _token: &'a TokenInfo,
        calendar_id: &'a str,
        _not_before: DateTime<Utc>,
        max_results: usize,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
        self.calls
            .lock()
            .unwrap()
            .push((calendar_id.to_string(), max_results));
        let result = {
            let mut script = self.script.lock().unwrap();
            let queue = script.entry(calendar_id.to_string()).or_default();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().map(clone_result)
            }
        };
        Box::pin(async move { result.unwrap_or_else(|| Ok(Vec::new())) })
    }
}

fn clone_result(result: &ProviderResult<Vec<RawEvent>>) -> ProviderResult<Vec<RawEvent>> {
    match result {
        Ok(events) => Ok(events.clone()),
        Err(e) => Err(ProviderError::new(e.code(), e.message())),
    }
}
