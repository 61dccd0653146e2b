//! Reminder timers.
//!
//! [`NotificationScheduler`] turns an [`EventIndex`] into armed timers: one
//! at each group's start time and one [`REMINDER_LEAD`] before it. Every
//! reconcile tears the previous set down before arming the new one.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use calnotify_core::{EventIndex, ReminderBatch};
use calnotify_providers::{ChannelDirectory, NotificationSink};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Longest delay tokio's timer wheel accepts (about 2.2 years).
pub const MAX_TIMER_DELAY: Duration = Duration::from_millis(68_719_476_734);

/// How long before the start the early reminder fires.
pub const REMINDER_LEAD: Duration = Duration::from_secs(15 * 60);

/// Which of a group's two reminders a timer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    /// Fires [`REMINDER_LEAD`] before the start.
    Lead,
    /// Fires at the start.
    AtStart,
}

impl ReminderKind {
    /// How long before the start this reminder fires.
    pub fn offset(self) -> chrono::Duration {
        match self {
            Self::Lead => chrono::Duration::seconds(REMINDER_LEAD.as_secs() as i64),
            Self::AtStart => chrono::Duration::zero(),
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lead => write!(f, "lead"),
            Self::AtStart => write!(f, "at_start"),
        }
    }
}

/// Returns the delays of the reminders to arm for a group starting at
/// `start_time`.
///
/// Offsets that are not strictly positive are dropped, as are offsets
/// longer than [`MAX_TIMER_DELAY`].
pub fn reminder_delays(
    start_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<(ReminderKind, Duration)> {
    let until_start = start_time - now;
    let mut delays = Vec::with_capacity(2);

    for kind in [ReminderKind::Lead, ReminderKind::AtStart] {
        // `to_std` fails for negative offsets.
        let Ok(delay) = (until_start - kind.offset()).to_std() else {
            continue;
        };
        if delay.is_zero() {
            continue;
        }
        if delay > MAX_TIMER_DELAY {
            debug!(
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                "reminder beyond timer range, skipping"
            );
            continue;
        }
        delays.push((kind, delay));
    }

    delays
}

/// Delivers a fired reminder to its channel.
pub struct ReminderDelivery {
    sink: Arc<dyn NotificationSink>,
    directory: Arc<ChannelDirectory>,
    emphasize: HashSet<String>,
}

impl ReminderDelivery {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        directory: Arc<ChannelDirectory>,
        emphasize: HashSet<String>,
    ) -> Self {
        Self {
            sink,
            directory,
            emphasize,
        }
    }

    /// Posts the batch. Failures are logged and never retried.
    pub async fn deliver(&self, batch: &ReminderBatch) {
        let Some(channel_id) = self.directory.resolve(&batch.channel) else {
            error!(channel = %batch.channel, "unknown destination channel, reminder dropped");
            return;
        };

        let emphasize = self.emphasize.contains(&batch.channel);
        match self.sink.post_reminder(channel_id, batch, emphasize).await {
            Ok(()) => info!(
                channel = %batch.channel,
                events = batch.events.len(),
                "posted reminder"
            ),
            Err(e) => error!(channel = %batch.channel, error = %e, "failed to post reminder"),
        }
    }
}

/// A reminder timer owned by the scheduler.
///
/// Only the wait is cancellable: once the deadline passes, the delivery
/// runs to completion even if the timer is cancelled meanwhile.
pub struct ArmedTimer {
    channel: String,
    start_time: DateTime<Utc>,
    kind: ReminderKind,
    fire_at: DateTime<Utc>,
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ArmedTimer {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn kind(&self) -> ReminderKind {
        self.kind
    }

    pub fn fire_at(&self) -> DateTime<Utc> {
        self.fire_at
    }

    /// Returns true once the deadline passed or the timer was cancelled.
    pub fn has_fired(&self) -> bool {
        self.cancel.is_closed()
    }

    /// Returns true once the timer task, delivery included, is done.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl fmt::Debug for ArmedTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmedTimer")
            .field("channel", &self.channel)
            .field("start_time", &self.start_time)
            .field("kind", &self.kind)
            .field("fire_at", &self.fire_at)
            .finish_non_exhaustive()
    }
}

/// Owns the set of armed reminder timers.
pub struct NotificationScheduler {
    delivery: Arc<ReminderDelivery>,
    timers: Vec<ArmedTimer>,
}

impl NotificationScheduler {
    pub fn new(delivery: Arc<ReminderDelivery>) -> Self {
        Self {
            delivery,
            timers: Vec::new(),
        }
    }

    /// Replaces the armed timers with the ones `index` calls for.
    ///
    /// All previous timers are cancelled before any new timer is armed.
    /// Each timer delivers its group's full batch. Returns the number of
    /// timers armed.
    pub fn reconcile(&mut self, index: &EventIndex, now: DateTime<Utc>) -> usize {
        let cancelled = self.cancel_all();
        let armed_at = Instant::now();

        for group in index.groups() {
            let delays = reminder_delays(group.start_time, now);
            if delays.is_empty() {
                debug!(
                    channel = %group.channel,
                    start_time = %group.start_time,
                    "no reminder left to arm"
                );
                continue;
            }

            let batch = Arc::new(group.to_batch());
            for (kind, delay) in delays {
                let deadline = armed_at + delay;
                let delivery = self.delivery.clone();
                let task_batch = batch.clone();
                let (cancel, cancelled) = oneshot::channel();
                let handle = tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = cancelled => return,
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                    delivery.deliver(&task_batch).await;
                });

                debug!(
                    channel = %group.channel,
                    start_time = %group.start_time,
                    kind = %kind,
                    delay_secs = delay.as_secs(),
                    "armed reminder"
                );
                self.timers.push(ArmedTimer {
                    channel: group.channel.to_string(),
                    start_time: group.start_time,
                    kind,
                    fire_at: group.start_time - kind.offset(),
                    cancel,
                    handle,
                });
            }
        }

        info!(
            groups = index.group_count(),
            armed = self.timers.len(),
            cancelled,
            "reconciled reminder timers"
        );
        self.timers.len()
    }

    /// Cancels every armed timer. Returns how many were still waiting.
    ///
    /// Timers already delivering are left to finish.
    pub fn cancel_all(&mut self) -> usize {
        let mut pending = 0;
        for timer in self.timers.drain(..) {
            if timer.cancel.send(()).is_ok() {
                pending += 1;
            }
        }
        pending
    }

    /// Returns the number of timers armed by the last reconcile.
    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    pub fn armed(&self) -> impl Iterator<Item = &ArmedTimer> {
        self.timers.iter()
    }
}

impl Drop for NotificationScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
