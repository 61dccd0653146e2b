//! One refresh cycle, end to end.

use std::sync::Arc;

use calnotify_core::ChannelCalendarPairing;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::auth::AuthBroker;
use crate::error::{ServerError, ServerResult};
use crate::grouper::EventGrouper;
use crate::reminders::NotificationScheduler;

/// Summary of a finished refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub groups: usize,
    pub events: usize,
    pub timers: usize,
    pub failed_pairings: usize,
}

/// Source of the current wall-clock time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wires the broker, grouper and scheduler into refresh cycles.
pub struct ReminderEngine {
    broker: Arc<AuthBroker>,
    grouper: EventGrouper,
    scheduler: Mutex<NotificationScheduler>,
    pairings: Vec<ChannelCalendarPairing>,
    clock: Clock,
}

impl ReminderEngine {
    pub fn new(
        broker: Arc<AuthBroker>,
        grouper: EventGrouper,
        scheduler: NotificationScheduler,
        pairings: Vec<ChannelCalendarPairing>,
    ) -> Self {
        Self {
            broker,
            grouper,
            scheduler: Mutex::new(scheduler),
            pairings,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the wall clock, which defaults to [`Utc::now`].
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn broker(&self) -> &Arc<AuthBroker> {
        &self.broker
    }

    /// Obtains a credential, rebuilds the event index and re-arms timers.
    ///
    /// The scheduler lock is held for the whole cycle so two cycles never
    /// interleave.
    ///
    /// # Errors
    ///
    /// Fails if no credential can be obtained, or with
    /// [`ServerError::CredentialRejected`] if the calendar refuses it; the
    /// armed timers are then left untouched and the credential is
    /// invalidated for the next cycle. Other query and delivery failures are
    /// logged and absorbed.
    pub async fn run_cycle(&self) -> ServerResult<CycleReport> {
        let mut scheduler = self.scheduler.lock().await;
        info!(pairings = self.pairings.len(), "refresh cycle started");

        let token = self.broker.ensure_credential().await?;
        let report = self
            .grouper
            .build_index(&token, &self.pairings, (self.clock)())
            .await;
        if report.credential_rejected {
            warn!(
                armed = scheduler.armed_count(),
                "credential rejected, keeping existing reminders"
            );
            self.broker.invalidate(&token).await;
            return Err(ServerError::CredentialRejected);
        }

        // Queries may have taken a while; offsets count from here.
        let timers = scheduler.reconcile(&report.index, (self.clock)());

        let cycle = CycleReport {
            groups: report.index.group_count(),
            events: report.index.event_count(),
            timers,
            failed_pairings: report.failed.len(),
        };
        info!(
            groups = cycle.groups,
            events = cycle.events,
            timers = cycle.timers,
            failed_pairings = cycle.failed_pairings,
            skipped_events = report.skipped,
            "refresh cycle finished"
        );
        Ok(cycle)
    }

    /// Returns the number of armed timers.
    pub async fn armed_count(&self) -> usize {
        self.scheduler.lock().await.armed_count()
    }

    /// Cancels every armed timer.
    pub async fn shutdown(&self) {
        let cancelled = self.scheduler.lock().await.cancel_all();
        info!(cancelled, "reminder timers cancelled");
    }
}
