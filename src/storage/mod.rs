//! Storage backends for the checker's external collaborators
//!
//! ## Design
//!
//! - **Trait-based**: [`ResultStore`], [`EntityRegistry`] and [`SettingsSource`]
//!   keep the checker core independent of the concrete database
//! - **Async**: all operations are async for use from Tokio actors
//! - **Batch-oriented**: results are written as grouped inserts
//!
//! ## Backends
//!
//! - **SQLite** (default): embedded database, shared between processes
//! - **In-Memory**: no persistence, for testing and single-process runs
//!
//! ## Usage
//!
//! ```no_run
//! use sitewatch::storage::sqlite::SqliteBackend;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./sitewatch.db").await?;
//!     // Use with the batch persister, scheduler and settings sync
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use backend::{EntityRegistry, HealthStatus, ResultStore, SettingsSource};
pub use error::{StorageError, StorageResult};
pub use schema::{CheckEvent, DynamicSettings, SettingsRecord, UptimeLogRow};
