//! SchedulerActor - turns registry entries into queued jobs
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → load registry → due? → push Job → [queue]
//!     ↑
//!     └─── Commands (RunNow, Shutdown)
//! ```
//!
//! Each entity is dispatched at most once per `interval_seconds`, measured
//! from its previous dispatch. Dispatch lags the due time by at most one tick.
//! The last-dispatch map lives only in memory: after a restart every entity
//! is due immediately. The scheduler never looks at the queue depth.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, instrument, trace, warn};

use super::messages::{CycleReport, SchedulerCommand};
use crate::EntityId;
use crate::queue::JobQueue;
use crate::storage::EntityRegistry;

/// Last dispatch time per entity, in epoch milliseconds
#[derive(Debug, Default)]
pub struct LastDispatchRegistry {
    last: HashMap<EntityId, i64>,
}

impl LastDispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An entity that was never dispatched is due right away
    pub fn is_due(&self, id: EntityId, interval_seconds: i64, now_ms: i64) -> bool {
        match self.last.get(&id) {
            None => true,
            Some(last) => now_ms.saturating_sub(*last) >= interval_seconds.saturating_mul(1000),
        }
    }

    pub fn mark(&mut self, id: EntityId, now_ms: i64) {
        self.last.insert(id, now_ms);
    }

    pub fn last_dispatch(&self, id: EntityId) -> Option<i64> {
        self.last.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

pub struct Scheduler {
    registry: Arc<dyn EntityRegistry>,
    queue: Arc<dyn JobQueue>,
    last_dispatch: LastDispatchRegistry,
}

impl Scheduler {
    pub fn new(registry: Arc<dyn EntityRegistry>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            registry,
            queue,
            last_dispatch: LastDispatchRegistry::new(),
        }
    }

    pub fn last_dispatch(&self) -> &LastDispatchRegistry {
        &self.last_dispatch
    }

    /// One dispatch pass at `now_ms`
    ///
    /// A registry failure skips the whole cycle. A failed push leaves the
    /// entity unmarked, so it is due again on the next cycle.
    pub async fn run_cycle(&mut self, now_ms: i64) -> CycleReport {
        let entities = match self.registry.load_schedulable().await {
            Ok(entities) => entities,
            Err(e) => {
                warn!("failed to load registry, skipping cycle: {e}");
                return CycleReport {
                    skipped: true,
                    ..CycleReport::default()
                };
            }
        };

        let mut report = CycleReport {
            eligible: entities.len(),
            ..CycleReport::default()
        };

        for entity in entities.iter().filter(|entity| entity.is_schedulable()) {
            if !self
                .last_dispatch
                .is_due(entity.id, entity.interval_seconds, now_ms)
            {
                continue;
            }

            match self.queue.push(&entity.to_job()).await {
                Ok(()) => {
                    trace!("enqueued check for {} ({})", entity.id, entity.url);
                    self.last_dispatch.mark(entity.id, now_ms);
                    report.enqueued += 1;
                }
                Err(e) => {
                    warn!("failed to enqueue check for {}: {e}", entity.id);
                    report.failed += 1;
                }
            }
        }

        if report.enqueued > 0 {
            debug!("enqueued {} of {} entities", report.enqueued, report.eligible);
        }

        report
    }
}

pub struct SchedulerActor {
    scheduler: Scheduler,
    tick: Duration,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl SchedulerActor {
    pub fn new(
        scheduler: Scheduler,
        tick: Duration,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        Self {
            scheduler,
            tick,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting scheduler actor (tick {:?})", self.tick);

        let mut ticker = interval(self.tick);
        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scheduler.run_cycle(Utc::now().timestamp_millis()).await;
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(SchedulerCommand::RunNow { respond_to }) => {
                        let report = self.scheduler.run_cycle(Utc::now().timestamp_millis()).await;
                        let _ = respond_to.send(report);
                    }
                    Some(SchedulerCommand::Shutdown { respond_to }) => {
                        debug!("received shutdown command");
                        shutdown_reply = Some(respond_to);
                        break;
                    }
                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                }
            }
        }

        debug!("scheduler actor stopped");

        // No cycle runs past this point, nothing more reaches the queue
        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(());
        }
    }
}

/// Handle for controlling a SchedulerActor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn spawn(scheduler: Scheduler, tick: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = SchedulerActor::new(scheduler, tick, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn run_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive response")
    }

    /// Stop the actor and wait until it has exited
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("failed to receive response")
    }
}
