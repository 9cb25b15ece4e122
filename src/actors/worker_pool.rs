//! WorkerPool - pulls jobs and runs them under a concurrency ceiling
//!
//! ## Dispatch Loop
//!
//! ```text
//! ┌─▶ active >= max? ──yes──▶ wait full_wait ──┐
//! │        │ no                                │
//! │   pop up to min(max - active, batch_size)  │
//! │        │                                   │
//! │   none? ──yes──▶ wait idle_wait ───────────┤
//! │        │ no                                │
//! │   spawn one check task per job             │
//! └────────┴───────────────────────────────────┘
//! ```
//!
//! Tasks are not awaited as a batch: as soon as one finishes its slot is
//! available to the next pull. The ceiling is read fresh from
//! [`LiveSettings`] on every iteration.
//!
//! The slot count is read and then incremented per job without an atomic
//! reservation. Only the loop itself dispatches, so the ceiling holds as
//! long as it is not lowered; after a live decrease the pool simply stops
//! pulling until enough tasks have finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, trace, warn};

use super::persister::PersisterHandle;
use super::settings_sync::LiveSettings;
use super::shutdown::ShutdownToken;
use crate::Job;
use crate::config::WorkerConfig;
use crate::monitors::HealthChecker;
use crate::queue::JobQueue;
use crate::stats::{CheckStats, StatsSummary};

/// Poll period while waiting for in-flight checks at shutdown
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of running check tasks, plus the highest value seen
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Count one more running task until the guard is dropped
    pub fn enter(self: &Arc<Self>) -> ActiveGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ActiveGuard {
            gauge: Arc::clone(self),
        }
    }
}

pub struct ActiveGuard {
    gauge: Arc<ConcurrencyGauge>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What happened during shutdown
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Jobs removed from the queue without being checked
    pub cleared_jobs: usize,

    /// Checks still running when the grace period ran out
    pub abandoned: usize,

    pub summary: StatsSummary,
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    checker: Arc<HealthChecker>,
    persister: PersisterHandle,
    settings: Arc<LiveSettings>,
    stats: Arc<CheckStats>,
    gauge: Arc<ConcurrencyGauge>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        checker: Arc<HealthChecker>,
        persister: PersisterHandle,
        settings: Arc<LiveSettings>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            checker,
            persister,
            settings,
            stats: Arc::new(CheckStats::new()),
            gauge: Arc::new(ConcurrencyGauge::new()),
            config,
        }
    }

    pub fn gauge(&self) -> Arc<ConcurrencyGauge> {
        self.gauge.clone()
    }

    pub fn stats(&self) -> Arc<CheckStats> {
        self.stats.clone()
    }

    /// Dispatch until `shutdown` fires, then run the shutdown sequence
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: ShutdownToken) -> ShutdownReport {
        info!(
            "worker pool started (max concurrent {}, batch size {})",
            self.settings.max_concurrent(),
            self.config.batch_size
        );

        let full_wait = Duration::from_millis(self.config.full_wait_ms);
        let idle_wait = Duration::from_millis(self.config.idle_wait_ms);
        let summary_interval = Duration::from_secs(self.config.summary_interval_secs.max(1));
        let mut last_summary = Instant::now();

        while !shutdown.is_shutdown() {
            let max = self.settings.max_concurrent();
            let active = self.gauge.active();

            let delay = if active >= max {
                Some(full_wait)
            } else {
                let slots = (max - active).min(self.config.batch_size.max(1));
                match self.pull(slots).await {
                    0 => Some(idle_wait),
                    _ => None,
                }
            };

            if last_summary.elapsed() >= summary_interval {
                info!("{}", self.stats.summary());
                last_summary = Instant::now();
            }

            if let Some(delay) = delay {
                tokio::select! {
                    _ = shutdown.wait() => {}
                    _ = sleep(delay) => {}
                }
            } else {
                // A long run of full pulls must not starve the rest of the runtime
                tokio::task::yield_now().await;
            }
        }

        self.shutdown().await
    }

    /// Pop up to `slots` jobs and start a check for each
    async fn pull(&self, slots: usize) -> usize {
        let mut pulled = 0;

        while pulled < slots {
            match self.queue.pop().await {
                Ok(Some(job)) => {
                    self.dispatch(job);
                    pulled += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("failed to pop from queue: {e}");
                    break;
                }
            }
        }

        if pulled > 0 {
            trace!("dispatched {pulled} jobs ({} active)", self.gauge.active());
            self.stats.record_batch();
        }

        pulled
    }

    fn dispatch(&self, job: Job) {
        // Counted before the task exists so the next loop iteration sees it
        let guard = self.gauge.enter();

        let checker = self.checker.clone();
        let stats = self.stats.clone();
        let persister = self.persister.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let result = checker.check(&job).await;
            stats.record(&result);
            persister.submit(result);
        });
    }

    async fn shutdown(self) -> ShutdownReport {
        info!("worker pool shutting down");

        if let Err(e) = self.persister.flush().await {
            warn!("failed to flush results: {e:#}");
        }

        let cleared_jobs = match self.queue.clear().await {
            Ok(cleared) => {
                info!("cleared {cleared} queued jobs");
                cleared
            }
            Err(e) => {
                warn!("failed to clear the queue: {e}");
                0
            }
        };

        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        let deadline = Instant::now() + grace;
        while self.gauge.active() > 0 && Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(remaining.min(SHUTDOWN_POLL_INTERVAL)).await;
        }

        let abandoned = self.gauge.active();
        if abandoned > 0 {
            warn!("abandoning {abandoned} in-flight checks after {grace:?}");
        } else {
            debug!("all in-flight checks finished");
        }

        match self.persister.drain().await {
            Ok(stats) => debug!("persister drained ({} persisted)", stats.persisted),
            Err(e) => warn!("failed to drain results: {e:#}"),
        }

        let summary = self.stats.summary();
        info!("{summary}");

        ShutdownReport {
            cleared_jobs,
            abandoned,
            summary,
        }
    }
}
