//! Job queue shared between the scheduler and the worker pool
//!
//! The queue is the single coordination point of the pipeline:
//!
//! ```text
//! Scheduler ──push──▶ [ job | job | job ] ──pop──▶ Worker Pool
//! ```
//!
//! Semantics are deliberately minimal: FIFO, no acknowledgment, no visibility
//! timeout and no depth cap. A pop removes the job for good; a worker that
//! dies between pop and result emission loses that check until the next
//! scheduled interval. Each `pop` is atomic at the single-item level, so any
//! number of consumers can pop concurrently without extra locking.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::Job;
use crate::storage::StorageResult;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job at the producer end. Never rejects for size.
    async fn push(&self, job: &Job) -> StorageResult<()>;

    /// Remove and return the oldest job, if any
    async fn pop(&self) -> StorageResult<Option<Job>>;

    /// Drop every queued job, returning how many were removed
    async fn clear(&self) -> StorageResult<usize>;

    async fn len(&self) -> StorageResult<usize>;

    async fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len().await? == 0)
    }
}
