//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Events**: [`CheckEvent`]s are broadcast to any number of subscribers
//! 3. **Reports**: plain data returned over oneshot channels

use tokio::sync::oneshot;

use crate::storage::DynamicSettings;

pub use crate::storage::CheckEvent;

/// Commands that can be sent to the SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a dispatch cycle right away (bypassing the tick timer)
    RunNow {
        respond_to: oneshot::Sender<CycleReport>,
    },

    /// Stop dispatching; answered once the actor loop has exited
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Outcome of one scheduler cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entities returned by the registry
    pub eligible: usize,

    /// Jobs pushed to the queue
    pub enqueued: usize,

    /// Due entities whose push failed (retried on the next tick)
    pub failed: usize,

    /// The registry could not be read, nothing was dispatched
    pub skipped: bool,
}

/// Commands that can be sent to the BatchPersister
///
/// Results themselves travel on a separate unbounded channel so that
/// submitting never waits on the persister.
#[derive(Debug)]
pub enum PersisterCommand {
    /// Flush the current buffer once
    Flush {
        respond_to: oneshot::Sender<FlushOutcome>,
    },

    /// Flush repeatedly until the buffer is empty
    Drain {
        respond_to: oneshot::Sender<PersisterStats>,
    },

    GetStats {
        respond_to: oneshot::Sender<PersisterStats>,
    },

    /// Drain, close the result store and stop
    Shutdown {
        respond_to: oneshot::Sender<PersisterStats>,
    },
}

/// Result of a single flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Empty,

    /// All buffered results were written and published
    Persisted(usize),

    /// The write failed; first-time entries went back to the buffer, entries
    /// that had already been retried were dropped
    Failed { requeued: usize, dropped: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersisterStats {
    /// Results waiting for the next flush
    pub buffered: usize,
    pub flush_count: u64,
    pub persisted: u64,
    pub published: u64,
    pub dropped: u64,
}

/// Commands that can be sent to the SettingsSyncActor
#[derive(Debug)]
pub enum SettingsCommand {
    /// Read the settings store immediately
    SyncNow {
        respond_to: oneshot::Sender<anyhow::Result<DynamicSettings>>,
    },

    Shutdown,
}
