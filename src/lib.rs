pub mod actors;
pub mod app;
pub mod config;
pub mod monitors;
pub mod net;
pub mod queue;
pub mod stats;
pub mod storage;
pub mod telemetry;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a monitored entity in the registry
pub type EntityId = i64;

/// An endpoint registered for periodic reachability checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredEntity {
    pub id: EntityId,
    pub url: String,
    pub name: Option<String>,
    pub interval_seconds: i64,
    pub notification_target: Option<String>,
}

impl MonitoredEntity {
    /// Only entities with a positive interval take part in scheduling
    pub fn is_schedulable(&self) -> bool {
        self.interval_seconds > 0
    }

    pub fn to_job(&self) -> Job {
        Job {
            entity_id: self.id,
            url: self.url.clone(),
            name: self.name.clone(),
        }
    }
}

/// A single requested probe, as it travels through the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub entity_id: EntityId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(CheckStatus::Up),
            "down" => Ok(CheckStatus::Down),
            other => Err(format!("unknown check status '{other}'")),
        }
    }
}

/// Outcome of one cascade run for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub entity_id: EntityId,
    pub url: String,
    pub status: CheckStatus,
    /// Measured from the start of the cascade, across all probe stages
    pub response_time_ms: Option<u64>,
    pub error_reason: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn is_up(&self) -> bool {
        self.status == CheckStatus::Up
    }
}
