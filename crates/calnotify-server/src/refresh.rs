//! Periodic refresh driver.
//!
//! Runs one refresh cycle right away, then one every interval. A failed
//! cycle is retried with exponential backoff until one succeeds; the regular
//! interval resumes after that. Cycles never overlap because the driver
//! awaits each one before scheduling the next.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

/// Refresh driver configuration.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between successful cycles.
    pub interval: Duration,
    /// Delay before retrying the first failed cycle.
    pub initial_backoff: Duration,
    /// Maximum delay between retries.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

impl RefreshConfig {
    /// Creates a config with the given interval; backoff is capped at it.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            initial_backoff: Duration::from_secs(5),
            max_backoff: interval,
            backoff_multiplier: 2.0,
        }
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates backoff delay based on consecutive failures.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let multiplier = self
            .backoff_multiplier
            .powi(consecutive_failures as i32 - 1);
        let delay = base * multiplier;
        let max = self.max_backoff.as_secs_f64();

        Duration::from_secs_f64(delay.min(max))
    }

    /// Returns the delay before the next cycle.
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures > 0 {
            self.backoff_delay(consecutive_failures)
        } else {
            self.interval
        }
    }
}

/// Commands accepted by a running driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCommand {
    /// Run a cycle now.
    RefreshNow,
    /// Stop the driver.
    Stop,
}

/// Observable driver state.
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    /// Number of cycles run.
    pub cycles: u64,
    /// Number of consecutive failed cycles.
    pub consecutive_failures: u32,
    /// Last successful cycle.
    pub last_success: Option<DateTime<Utc>>,
    /// Last cycle attempt.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
}

impl RefreshState {
    /// Records a successful cycle.
    pub fn record_success(&mut self) {
        self.cycles += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());
        self.last_attempt = self.last_success;
        self.last_error = None;
    }

    /// Records a failed cycle.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.cycles += 1;
        self.consecutive_failures += 1;
        self.last_attempt = Some(Utc::now());
        self.last_error = Some(error.into());
    }
}

type SharedRefreshState = Arc<RwLock<RefreshState>>;

/// Drives refresh cycles until stopped.
pub struct RefreshDriver {
    config: RefreshConfig,
    state: SharedRefreshState,
    command_tx: mpsc::Sender<RefreshCommand>,
    command_rx: mpsc::Receiver<RefreshCommand>,
}

impl RefreshDriver {
    pub fn new(config: RefreshConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            state: Arc::default(),
            command_tx,
            command_rx,
        }
    }

    /// Returns a handle for controlling the driver once it runs.
    pub fn handle(&self) -> RefreshHandle {
        RefreshHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Runs the driver loop with the given cycle function.
    ///
    /// Returns when [`RefreshHandle::stop`] is called or every handle is
    /// dropped.
    pub async fn run<F, Fut, E>(self, cycle_fn: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let Self {
            config,
            state,
            command_tx,
            mut command_rx,
        } = self;
        // Only external handles keep the channel open.
        drop(command_tx);

        info!(
            interval_secs = config.interval.as_secs(),
            "refresh driver started"
        );

        run_cycle(&state, &cycle_fn).await;

        loop {
            let failures = state.read().await.consecutive_failures;
            let delay = config.next_delay(failures);
            debug!(delay_secs = delay.as_secs(), failures, "scheduling next refresh");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    run_cycle(&state, &cycle_fn).await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(RefreshCommand::RefreshNow) => {
                            debug!("received RefreshNow command");
                            run_cycle(&state, &cycle_fn).await;
                        }
                        Some(RefreshCommand::Stop) | None => {
                            info!("refresh driver stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn run_cycle<F, Fut, E>(state: &SharedRefreshState, cycle_fn: &F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    match cycle_fn().await {
        Ok(()) => state.write().await.record_success(),
        Err(e) => {
            let mut state = state.write().await;
            state.record_failure(e.to_string());
            warn!(
                error = %e,
                failures = state.consecutive_failures,
                "refresh cycle failed"
            );
        }
    }
}

/// Handle for controlling a running [`RefreshDriver`].
#[derive(Clone, Debug)]
pub struct RefreshHandle {
    command_tx: mpsc::Sender<RefreshCommand>,
    state: SharedRefreshState,
}

impl RefreshHandle {
    /// Triggers an immediate cycle.
    pub async fn refresh_now(&self) -> Result<(), mpsc::error::SendError<RefreshCommand>> {
        self.command_tx.send(RefreshCommand::RefreshNow).await
    }

    /// Stops the driver after its current cycle.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<RefreshCommand>> {
        self.command_tx.send(RefreshCommand::Stop).await
    }

    /// Returns a snapshot of the driver state.
    pub async fn state(&self) -> RefreshState {
        self.state.read().await.clone()
    }
}
