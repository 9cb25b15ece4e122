//! BatchPersister - buffers check results and writes them in groups
//!
//! ## Batching Strategy
//!
//! - **Size trigger**: flush as soon as `batch_size` results are buffered
//! - **Time trigger**: flush every `flush_interval`
//!
//! A flush writes the whole buffer as one grouped insert, then publishes one
//! [`CheckEvent`] per written result on the broadcast channel.
//!
//! ## Failure Handling
//!
//! A failed write puts the batch back at the front of the buffer, marked as
//! retried. If the retry fails too, those results are dropped and logged.
//! A result is therefore written (and published) at most once and attempted
//! at most twice. Nothing here ever blocks a check task: results arrive on an
//! unbounded channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{CheckEvent, FlushOutcome, PersisterCommand, PersisterStats};
use crate::CheckResult;
use crate::config::PersisterConfig;
use crate::storage::{ResultStore, UptimeLogRow};

/// Capacity of the live-update broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Pending {
    result: CheckResult,
    retried: bool,
}

pub struct BatchPersister {
    store: Arc<dyn ResultStore>,
    buffer: VecDeque<Pending>,
    result_rx: mpsc::UnboundedReceiver<CheckResult>,
    command_rx: mpsc::Receiver<PersisterCommand>,
    event_tx: broadcast::Sender<CheckEvent>,
    batch_size: usize,
    flush_interval: Duration,
    stats: PersisterStats,
}

impl BatchPersister {
    pub fn new(
        store: Arc<dyn ResultStore>,
        config: &PersisterConfig,
        result_rx: mpsc::UnboundedReceiver<CheckResult>,
        command_rx: mpsc::Receiver<PersisterCommand>,
        event_tx: broadcast::Sender<CheckEvent>,
    ) -> Self {
        let batch_size = config.batch_size.max(1);
        Self {
            store,
            buffer: VecDeque::with_capacity(batch_size),
            result_rx,
            command_rx,
            event_tx,
            batch_size,
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
            stats: PersisterStats::default(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting batch persister (batch size {}, interval {:?})",
            self.batch_size, self.flush_interval
        );

        let mut flush_ticker = time::interval(self.flush_interval);
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                Some(result) = self.result_rx.recv() => {
                    self.buffer.push_back(Pending { result, retried: false });
                    if self.buffer.len() >= self.batch_size {
                        trace!("size-based flush triggered ({} results)", self.buffer.len());
                        self.flush().await;
                    }
                }

                _ = flush_ticker.tick() => {
                    if !self.buffer.is_empty() {
                        trace!("time-based flush triggered ({} results)", self.buffer.len());
                        self.flush().await;
                    }
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(PersisterCommand::Flush { respond_to }) => {
                        self.collect_submitted();
                        let outcome = self.flush().await;
                        let _ = respond_to.send(outcome);
                    }
                    Some(PersisterCommand::Drain { respond_to }) => {
                        self.collect_submitted();
                        self.drain().await;
                        let _ = respond_to.send(self.stats());
                    }
                    Some(PersisterCommand::GetStats { respond_to }) => {
                        let _ = respond_to.send(self.stats());
                    }
                    Some(PersisterCommand::Shutdown { respond_to }) => {
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

        self.collect_submitted();
        self.drain().await;

        if let Err(e) = self.store.close().await {
            warn!("failed to close result store: {e}");
        }

        let stats = self.stats();
        info!(
            "batch persister stopped: {} persisted, {} published, {} dropped in {} flushes",
            stats.persisted, stats.published, stats.dropped, stats.flush_count
        );

        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(stats);
        }
    }

    /// Move results already submitted into the buffer
    fn collect_submitted(&mut self) {
        while let Ok(result) = self.result_rx.try_recv() {
            self.buffer.push_back(Pending {
                result,
                retried: false,
            });
        }
    }

    fn stats(&self) -> PersisterStats {
        PersisterStats {
            buffered: self.buffer.len(),
            ..self.stats
        }
    }

    /// Flush until the buffer is empty
    ///
    /// Terminates because every entry is attempted at most twice.
    async fn drain(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        debug!("draining {} buffered results", self.buffer.len());
        while !self.buffer.is_empty() {
            self.flush().await;
        }
    }

    async fn flush(&mut self) -> FlushOutcome {
        if self.buffer.is_empty() {
            return FlushOutcome::Empty;
        }

        let batch: Vec<Pending> = self.buffer.drain(..).collect();
        let rows = batch
            .iter()
            .map(|pending| UptimeLogRow::from_result(&pending.result))
            .collect();

        self.stats.flush_count += 1;

        match self.store.insert_results(rows).await {
            Ok(()) => {
                let written = batch.len();
                self.stats.persisted += written as u64;
                debug!("flushed {written} results");
                self.publish(&batch);
                FlushOutcome::Persisted(written)
            }
            Err(e) => {
                let (give_up, retry): (Vec<Pending>, Vec<Pending>) =
                    batch.into_iter().partition(|pending| pending.retried);

                if !give_up.is_empty() {
                    error!(
                        "dropping {} results after a failed retry: {e}",
                        give_up.len()
                    );
                    self.stats.dropped += give_up.len() as u64;
                }

                let requeued = retry.len();
                if requeued > 0 {
                    warn!("failed to persist {requeued} results, retrying once: {e}");
                    for pending in retry.into_iter().rev() {
                        self.buffer.push_front(Pending {
                            retried: true,
                            ..pending
                        });
                    }
                }

                FlushOutcome::Failed {
                    requeued,
                    dropped: give_up.len(),
                }
            }
        }
    }

    fn publish(&mut self, batch: &[Pending]) {
        for pending in batch {
            match self.event_tx.send(CheckEvent::from_result(&pending.result)) {
                Ok(_) => self.stats.published += 1,
                Err(_) => {
                    trace!("no subscribers for check events (this is OK)");
                }
            }
        }
    }
}

/// Handle for submitting results to and controlling a BatchPersister
#[derive(Clone)]
pub struct PersisterHandle {
    results: mpsc::UnboundedSender<CheckResult>,
    sender: mpsc::Sender<PersisterCommand>,
    events: broadcast::Sender<CheckEvent>,
}

impl PersisterHandle {
    pub fn spawn(store: Arc<dyn ResultStore>, config: &PersisterConfig) -> Self {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let actor = BatchPersister::new(store, config, result_rx, cmd_rx, event_tx.clone());
        tokio::spawn(actor.run());

        Self {
            results: result_tx,
            sender: cmd_tx,
            events: event_tx,
        }
    }

    /// Hand over a result; never waits
    pub fn submit(&self, result: CheckResult) {
        if let Err(e) = self.results.send(result) {
            warn!(
                "batch persister is gone, losing result for entity {}",
                e.0.entity_id
            );
        }
    }

    /// Receive every published check event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CheckEvent> {
        self.events.subscribe()
    }

    pub async fn flush(&self) -> Result<FlushOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PersisterCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn drain(&self) -> Result<PersisterStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PersisterCommand::Drain { respond_to: tx })
            .await
            .context("failed to send Drain command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn stats(&self) -> Result<PersisterStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PersisterCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    /// Drain, close the store and wait for the persister to stop
    pub async fn shutdown(&self) -> Result<PersisterStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PersisterCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("failed to receive response")
    }
}
