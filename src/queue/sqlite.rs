//! Queue backed by the `job_queue` table
//!
//! Lets a scheduler process and a worker process share one queue through the
//! same database file. Jobs are stored in their wire format
//! (`{"entityId", "url", "name"?}`) and popped with a single
//! `DELETE … RETURNING` statement, which SQLite executes atomically.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{instrument, warn};

use super::JobQueue;
use crate::Job;
use crate::storage::StorageResult;

pub struct SqliteQueue {
    pool: Pool<Sqlite>,
}

impl SqliteQueue {
    /// Build on a pool whose database has been migrated (see `SqliteBackend::pool`)
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn push(&self, job: &Job) -> StorageResult<()> {
        let payload = serde_json::to_string(job)?;

        sqlx::query("INSERT INTO job_queue (payload, enqueued_at) VALUES (?, ?)")
            .bind(payload)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn pop(&self) -> StorageResult<Option<Job>> {
        loop {
            let payload: Option<String> = sqlx::query_scalar(
                r#"
                DELETE FROM job_queue
                WHERE id = (SELECT id FROM job_queue ORDER BY id ASC LIMIT 1)
                RETURNING payload
                "#,
            )
            .fetch_optional(&self.pool)
            .await?;

            let Some(payload) = payload else {
                return Ok(None);
            };

            match serde_json::from_str(&payload) {
                Ok(job) => return Ok(Some(job)),
                // A malformed message is gone either way; move on to the next one
                Err(e) => warn!("discarding malformed job {payload:?}: {e}"),
            }
        }
    }

    async fn clear(&self) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM job_queue")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn len(&self) -> StorageResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
