//! Actor-based check pipeline
//!
//! Each long-running component runs as an independent async task and is
//! driven through a cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────┐        ┌──────────────────┐
//!  │ SettingsSync │──────▶ │   LiveSettings   │ (atomics)
//!  └──────────────┘        └────────┬─────────┘
//!                       read by     │
//!          ┌────────────────────────┼──────────────┐
//!          ▼                        ▼              ▼
//!  ┌──────────────┐  push  ┌──────────────┐  pop  ┌────────────┐
//!  │  Scheduler   │──────▶ │   JobQueue   │ ────▶ │ WorkerPool │
//!  └──────────────┘        └──────────────┘       └─────┬──────┘
//!                                                       │ spawn per job
//!                                               ┌───────▼───────┐
//!                                               │ HealthChecker │
//!                                               └───────┬───────┘
//!                                                       │ submit
//!                                               ┌───────▼────────┐
//!                                               │ BatchPersister │──▶ ResultStore
//!                                               └───────┬────────┘
//!                                                       │ broadcast
//!                                                       ▼
//!                                                  CheckEvent subscribers
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: Persisted results are published on a broadcast channel
//! 3. **Request/Response**: oneshot channels for synchronous queries
//! 4. **Shutdown**: the worker pool loop stops on a [`shutdown::ShutdownToken`]

pub mod messages;
pub mod persister;
pub mod scheduler;
pub mod settings_sync;
pub mod shutdown;
pub mod worker_pool;

pub use persister::PersisterHandle;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use settings_sync::{LiveSettings, SettingsSyncHandle};
pub use shutdown::{ShutdownSender, ShutdownToken, shutdown_channel};
pub use worker_pool::{ConcurrencyGauge, ShutdownReport, WorkerPool};
