//! SettingsSyncActor - hot reload of the tunable parameters
//!
//! The actor reads the settings store on a fixed interval and swaps the
//! values in [`LiveSettings`], which the scheduler, worker pool and health
//! checker read on every use. A failed read keeps the previous values.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use super::messages::SettingsCommand;
use crate::config::Config;
use crate::storage::{DynamicSettings, SettingsRecord, SettingsSource, StorageResult};

/// Lock-free shared view of [`DynamicSettings`]
#[derive(Debug)]
pub struct LiveSettings {
    default_interval: AtomicU64,
    max_concurrent: AtomicUsize,
    request_timeout_ms: AtomicU64,
    retry_attempts: AtomicU32,
}

impl LiveSettings {
    pub fn new(initial: DynamicSettings) -> Self {
        Self {
            default_interval: AtomicU64::new(initial.default_interval),
            max_concurrent: AtomicUsize::new(initial.max_concurrent_checks),
            request_timeout_ms: AtomicU64::new(initial.request_timeout_ms),
            retry_attempts: AtomicU32::new(initial.retry_attempts),
        }
    }

    /// Startup values, until the first successful sync
    pub fn from_config(config: &Config) -> Self {
        Self::new(DynamicSettings {
            default_interval: config.settings.default_interval,
            max_concurrent_checks: config.worker.max_concurrent,
            request_timeout_ms: config.worker.request_timeout_ms,
            retry_attempts: config.settings.retry_attempts,
        })
    }

    pub fn snapshot(&self) -> DynamicSettings {
        DynamicSettings {
            default_interval: self.default_interval(),
            max_concurrent_checks: self.max_concurrent(),
            request_timeout_ms: self.request_timeout_ms.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts(),
        }
    }

    pub fn default_interval(&self) -> u64 {
        self.default_interval.load(Ordering::Relaxed)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::Relaxed)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.load(Ordering::Relaxed))
    }

    /// Advisory only, the cascade never retries
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.load(Ordering::Relaxed)
    }

    pub fn set_max_concurrent(&self, max: usize) {
        if max > 0 {
            self.max_concurrent.store(max, Ordering::Relaxed);
        }
    }

    /// Swap in every field present in `record`. Returns whether anything changed.
    ///
    /// Zero is rejected for the interval, the ceiling and the timeout: any of
    /// them would stall checking entirely.
    pub fn apply(&self, record: &SettingsRecord) -> bool {
        let mut changed = false;

        if let Some(value) = nonzero(record.default_interval, "defaultInterval") {
            changed |= self.default_interval.swap(value, Ordering::Relaxed) != value;
        }
        if let Some(value) = nonzero(record.max_concurrent_checks, "maxConcurrentChecks") {
            changed |= self.max_concurrent.swap(value, Ordering::Relaxed) != value;
        }
        if let Some(value) = nonzero(record.request_timeout_ms, "requestTimeout") {
            changed |= self.request_timeout_ms.swap(value, Ordering::Relaxed) != value;
        }
        if let Some(value) = record.retry_attempts {
            changed |= self.retry_attempts.swap(value, Ordering::Relaxed) != value;
        }

        changed
    }
}

fn nonzero<T: PartialEq + Default>(value: Option<T>, field: &str) -> Option<T> {
    match value {
        Some(v) if v == T::default() => {
            warn!("ignoring {field}=0, keeping the current value");
            None
        }
        other => other,
    }
}

pub struct SettingsSyncActor {
    source: Arc<dyn SettingsSource>,
    settings: Arc<LiveSettings>,
    sync_interval: Duration,
    command_rx: mpsc::Receiver<SettingsCommand>,
}

impl SettingsSyncActor {
    pub fn new(
        source: Arc<dyn SettingsSource>,
        settings: Arc<LiveSettings>,
        sync_interval: Duration,
        command_rx: mpsc::Receiver<SettingsCommand>,
    ) -> Self {
        Self {
            source,
            settings,
            sync_interval,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting settings sync actor");

        let mut ticker = interval(self.sync_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync().await {
                        warn!("failed to sync settings, keeping current values: {e}");
                    }
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(SettingsCommand::SyncNow { respond_to }) => {
                        let result = self.sync().await.map_err(anyhow::Error::from);
                        let _ = respond_to.send(result);
                    }
                    Some(SettingsCommand::Shutdown) => {
                        debug!("received shutdown command");
                        break;
                    }
                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                }
            }
        }

        debug!("settings sync actor stopped");
    }

    async fn sync(&self) -> StorageResult<DynamicSettings> {
        let record = self.source.load_settings().await?;
        if self.settings.apply(&record) {
            info!("settings updated: {:?}", self.settings.snapshot());
        }
        Ok(self.settings.snapshot())
    }
}

/// Handle for controlling a SettingsSyncActor
#[derive(Clone)]
pub struct SettingsSyncHandle {
    sender: mpsc::Sender<SettingsCommand>,
}

impl SettingsSyncHandle {
    pub fn spawn(
        source: Arc<dyn SettingsSource>,
        settings: Arc<LiveSettings>,
        sync_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = SettingsSyncActor::new(source, settings, sync_interval, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Read the store now and return the resulting live values
    pub async fn sync_now(&self) -> Result<DynamicSettings> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SettingsCommand::SyncNow { respond_to: tx })
            .await
            .context("failed to send SyncNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SettingsCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
