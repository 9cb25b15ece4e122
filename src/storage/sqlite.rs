//! SQLite storage backend implementation
//!
//! One database file backs every collaborator of the checker core:
//!
//! - `websites`: the entity registry (read by the scheduler)
//! - `uptime_logs`: persisted check results (written by the batch persister)
//! - `settings`: the tunable parameter field map (read by settings sync)
//! - `job_queue`: the shared queue (see [`crate::queue::sqlite`])
//!
//! ## Features
//!
//! - **WAL mode**: scheduler and worker processes can share the file
//! - **Connection pooling**: the pool is shared with the SQLite queue
//! - **Migrations**: automatic schema versioning with sqlx

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{EntityRegistry, HealthStatus, ResultStore, SettingsSource};
use super::error::{StorageError, StorageResult};
use super::schema::{SettingsRecord, UptimeLogRow};
use crate::{EntityId, MonitoredEntity};

/// Rows per INSERT statement, keeps bind parameters well under SQLite's limit
const MAX_ROWS_PER_STATEMENT: usize = 500;

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database and run migrations
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use sitewatch::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./sitewatch.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Connection pool, shared with the SQLite job queue
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl ResultStore for SqliteBackend {
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert_results(&self, rows: Vec<UptimeLogRow>) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO uptime_logs (entity_id, status, response_time_ms, checked_at, error_reason) ",
            );
            builder.push_values(chunk, |mut values, row| {
                values
                    .push_bind(row.entity_id)
                    .push_bind(row.status.as_str())
                    .push_bind(row.response_time_ms.map(|ms| ms as i64))
                    .push_bind(row.checked_at.timestamp_millis())
                    .push_bind(row.error_reason.clone());
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        debug!("inserted {} results", rows.len());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn latest_results(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> StorageResult<Vec<UptimeLogRow>> {
        let rows = sqlx::query(
            r#"
            SELECT entity_id, status, response_time_ms, checked_at, error_reason
            FROM uptime_logs
            WHERE entity_id = ?
            ORDER BY checked_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(entity_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(UptimeLogRow {
                    entity_id: row.get("entity_id"),
                    status: status.parse().map_err(StorageError::SerializationError)?,
                    response_time_ms: row
                        .get::<Option<i64>, _>("response_time_ms")
                        .map(|ms| ms as u64),
                    checked_at: Self::millis_to_timestamp(row.get("checked_at")),
                    error_reason: row.get("error_reason"),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl EntityRegistry for SqliteBackend {
    #[instrument(skip(self))]
    async fn load_schedulable(&self) -> StorageResult<Vec<MonitoredEntity>> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, name, interval_seconds, notification_target
            FROM websites
            WHERE interval_seconds > 0
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MonitoredEntity {
                id: row.get("id"),
                url: row.get("url"),
                name: row.get("name"),
                interval_seconds: row.get("interval_seconds"),
                notification_target: row.get("notification_target"),
            })
            .collect())
    }

    #[instrument(skip_all, fields(count = entities.len()))]
    async fn upsert_entities(&self, entities: &[MonitoredEntity]) -> StorageResult<usize> {
        let mut tx = self.pool.begin().await?;

        for entity in entities {
            sqlx::query(
                r#"
                INSERT INTO websites (id, url, name, interval_seconds, notification_target)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (id) DO UPDATE SET
                    url = excluded.url,
                    name = excluded.name,
                    interval_seconds = excluded.interval_seconds,
                    notification_target = excluded.notification_target
                "#,
            )
            .bind(entity.id)
            .bind(&entity.url)
            .bind(&entity.name)
            .bind(entity.interval_seconds)
            .bind(&entity.notification_target)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(entities.len())
    }
}

#[async_trait]
impl SettingsSource for SqliteBackend {
    async fn load_settings(&self) -> StorageResult<SettingsRecord> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        let fields: HashMap<String, String> = rows.into_iter().collect();
        Ok(SettingsRecord::from_fields(&fields))
    }

    async fn store_settings(&self, record: &SettingsRecord) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in record.to_fields() {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES (?, ?)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
