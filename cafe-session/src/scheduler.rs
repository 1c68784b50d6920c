//! Proactive credential renewal.
//!
//! A [`RefreshScheduler`] lives exactly as long as one authenticated session.
//! It renews the credentials on a fixed interval, never runs two renewals at
//! once, and gives up after too many consecutive failures.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::session::{RefreshOutcome, SessionManager};

/// Consecutive-failure breaker for scheduled renewals.
///
/// Once open it stays open; only a new scheduler starts closed.
#[derive(Debug)]
struct FailureBreaker {
    failures: AtomicU32,
    threshold: u32,
    open: AtomicBool,
}

impl FailureBreaker {
    fn new(threshold: u32) -> Self {
        Self {
            failures: AtomicU32::new(0),
            threshold: threshold.max(1),
            open: AtomicBool::new(false),
        }
    }

    /// Record a failure. Returns true if this failure opened the breaker.
    fn record_failure(&self) -> bool {
        let count = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        count >= self.threshold && !self.open.swap(true, Ordering::SeqCst)
    }

    fn record_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Handle to the renewal timer of one authenticated session.
///
/// Dropping or stopping the handle cancels the timer. A renewal already in
/// flight is left to finish; its result is discarded by the manager if the
/// session has changed.
pub struct RefreshScheduler {
    interval: Duration,
    breaker: Arc<FailureBreaker>,
    cancel: CancellationToken,
}

impl RefreshScheduler {
    /// Start the timer for the session identified by `generation`.
    ///
    /// The interval is computed once here. The first renewal happens one
    /// full interval after start.
    pub(crate) fn start(
        manager: Weak<SessionManager>,
        generation: u64,
        config: &SessionConfig,
        parent: &CancellationToken,
    ) -> Self {
        let interval = config.refresh_interval();
        let breaker = Arc::new(FailureBreaker::new(config.failure_threshold));
        let cancel = parent.child_token();

        let task = SchedulerTask {
            manager,
            generation,
            interval,
            verbose: config.is_development,
            breaker: Arc::clone(&breaker),
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        debug!(
            generation,
            interval_secs = interval.as_secs(),
            threshold = breaker.threshold,
            "Refresh scheduler started"
        );

        Self {
            interval,
            breaker,
            cancel,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn failure_count(&self) -> u32 {
        self.breaker.failure_count()
    }

    /// Whether automatic renewal stopped after reaching the failure threshold.
    pub fn is_circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn reset_failures(&self) {
        self.breaker.record_success();
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Clone)]
struct SchedulerTask {
    manager: Weak<SessionManager>,
    generation: u64,
    interval: Duration,
    verbose: bool,
    breaker: Arc<FailureBreaker>,
    cancel: CancellationToken,
}

impl SchedulerTask {
    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(manager) = self.manager.upgrade() else {
                break;
            };
            if !manager.is_current(self.generation) || !manager.is_authenticated() {
                debug!(generation = self.generation, "Session changed, scheduler exiting");
                break;
            }

            let Some(guard) = manager.try_begin_refresh() else {
                debug!("Renewal already in flight, skipping tick");
                continue;
            };

            let attempt = self.clone();
            tokio::spawn(async move {
                let result = manager.renew_and_revalidate(attempt.generation).await;
                drop(guard);
                attempt.record(result);
            });
        }

        debug!(generation = self.generation, "Refresh scheduler stopped");
    }

    fn record(&self, result: Result<RefreshOutcome>) {
        if self.cancel.is_cancelled() {
            return;
        }

        match result {
            Ok(RefreshOutcome::Renewed) => {
                self.breaker.record_success();
                let minutes = self.interval.as_secs() / 60;
                if self.verbose {
                    info!("Token refreshed, next refresh in {} minutes", minutes);
                } else {
                    debug!("Token refreshed, next refresh in {} minutes", minutes);
                }
            }
            Ok(RefreshOutcome::Skipped | RefreshOutcome::Stale) => {}
            Err(e) => {
                let tripped = self.breaker.record_failure();
                warn!(
                    failures = self.breaker.failure_count(),
                    threshold = self.breaker.threshold,
                    error = %e,
                    "Scheduled token refresh failed"
                );
                if tripped {
                    warn!("Too many refresh failures, stopping automatic refresh");
                    self.cancel.cancel();
                }
            }
        }
    }
}
