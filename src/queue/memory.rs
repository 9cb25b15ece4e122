//! Process-local queue, for the single-process mode and tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::JobQueue;
use crate::Job;
use crate::storage::{StorageError, StorageResult};

#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, VecDeque<Job>>> {
        self.jobs
            .lock()
            .map_err(|_| StorageError::BackendError("queue lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, job: &Job) -> StorageResult<()> {
        self.lock()?.push_back(job.clone());
        Ok(())
    }

    async fn pop(&self) -> StorageResult<Option<Job>> {
        Ok(self.lock()?.pop_front())
    }

    async fn clear(&self) -> StorageResult<usize> {
        let mut jobs = self.lock()?;
        let cleared = jobs.len();
        jobs.clear();
        Ok(cleared)
    }

    async fn len(&self) -> StorageResult<usize> {
        Ok(self.lock()?.len())
    }
}
