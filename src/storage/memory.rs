//! In-memory storage backend (no persistence)
//!
//! Implements the result store, the registry and the settings source on top
//! of plain collections. It's useful for:
//! - Testing without database dependencies
//! - The single-process mode without a database (`"backend": "none"`)
//!
//! Write failures can be injected with [`MemoryBackend::fail_next_writes`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{EntityRegistry, HealthStatus, ResultStore, SettingsSource};
use super::error::{StorageError, StorageResult};
use super::schema::{SettingsRecord, UptimeLogRow};
use crate::{EntityId, MonitoredEntity};

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryBackend {
    results: RwLock<Vec<UptimeLogRow>>,
    entities: RwLock<BTreeMap<EntityId, MonitoredEntity>>,
    settings: RwLock<HashMap<String, String>>,

    /// Number of upcoming `insert_results` calls that will fail
    failing_writes: AtomicUsize,

    /// Number of `insert_results` calls, successful or not
    write_attempts: AtomicUsize,

    /// Registry reads fail while set (for scheduler failure tests)
    failing_registry: AtomicBool,

    /// Settings reads fail while set
    failing_settings: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: Vec<MonitoredEntity>) -> Self {
        Self {
            entities: RwLock::new(entities.into_iter().map(|e| (e.id, e)).collect()),
            ..Self::default()
        }
    }

    /// Make the next `count` result writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn set_registry_failing(&self, failing: bool) {
        self.failing_registry.store(failing, Ordering::SeqCst);
    }

    pub fn set_settings_failing(&self, failing: bool) {
        self.failing_settings.store(failing, Ordering::SeqCst);
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Every stored result, in insertion order
    pub async fn all_results(&self) -> Vec<UptimeLogRow> {
        self.results.read().await.clone()
    }

    pub async fn remove_entity(&self, id: EntityId) {
        self.entities.write().await.remove(&id);
    }
}

#[async_trait]
impl ResultStore for MemoryBackend {
    async fn insert_results(&self, rows: Vec<UptimeLogRow>) -> StorageResult<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::BackendError("injected write failure".to_string()));
        }

        debug!("in-memory backend: storing {} results", rows.len());
        self.results.write().await.extend(rows);
        Ok(())
    }

    async fn latest_results(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> StorageResult<Vec<UptimeLogRow>> {
        let results = self.results.read().await;
        let mut matching: Vec<UptimeLogRow> = results
            .iter()
            .filter(|row| row.entity_id == entity_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                (
                    "total_results".to_string(),
                    self.results.read().await.len().to_string(),
                ),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}

#[async_trait]
impl EntityRegistry for MemoryBackend {
    async fn load_schedulable(&self) -> StorageResult<Vec<MonitoredEntity>> {
        if self.failing_registry.load(Ordering::SeqCst) {
            return Err(StorageError::UnhealthyBackend(
                "registry unavailable".to_string(),
            ));
        }

        Ok(self
            .entities
            .read()
            .await
            .values()
            .filter(|entity| entity.is_schedulable())
            .cloned()
            .collect())
    }

    async fn upsert_entities(&self, entities: &[MonitoredEntity]) -> StorageResult<usize> {
        let mut stored = self.entities.write().await;
        for entity in entities {
            stored.insert(entity.id, entity.clone());
        }
        Ok(entities.len())
    }
}

#[async_trait]
impl SettingsSource for MemoryBackend {
    async fn load_settings(&self) -> StorageResult<SettingsRecord> {
        if self.failing_settings.load(Ordering::SeqCst) {
            return Err(StorageError::UnhealthyBackend(
                "settings store unavailable".to_string(),
            ));
        }

        Ok(SettingsRecord::from_fields(&*self.settings.read().await))
    }

    async fn store_settings(&self, record: &SettingsRecord) -> StorageResult<()> {
        self.settings.write().await.extend(record.to_fields());
        Ok(())
    }
}
