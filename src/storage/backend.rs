//! Storage traits
//!
//! The checker core talks to three external collaborators through these
//! traits: the durable result store, the entity registry and the settings
//! store. A single backend (SQLite or in-memory) usually implements all three.

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{SettingsRecord, UptimeLogRow};
use crate::{EntityId, MonitoredEntity};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Durable store for check results
///
/// ## Error Handling
///
/// A failed `insert_results` must leave the store without any of the rows,
/// so that the batch persister can retry the whole batch.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert a batch of results as one grouped write
    async fn insert_results(&self, rows: Vec<UptimeLogRow>) -> StorageResult<()>;

    /// The N most recent results for an entity, newest first
    async fn latest_results(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> StorageResult<Vec<UptimeLogRow>>;

    /// Lightweight liveness check of the underlying store
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the store and release resources
    async fn close(&self) -> StorageResult<()>;
}

/// Read view of the monitored entities
#[async_trait]
pub trait EntityRegistry: Send + Sync {
    /// All entities with `interval_seconds > 0`
    async fn load_schedulable(&self) -> StorageResult<Vec<MonitoredEntity>>;

    /// Insert or replace entities (used for seeding from configuration)
    async fn upsert_entities(&self, entities: &[MonitoredEntity]) -> StorageResult<usize>;
}

/// Source of the externally mutable [`SettingsRecord`]
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load_settings(&self) -> StorageResult<SettingsRecord>;

    async fn store_settings(&self, record: &SettingsRecord) -> StorageResult<()>;
}
