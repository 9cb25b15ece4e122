//! Row and message shapes crossing the storage and publish boundaries
//!
//! Two representations leave the worker for every completed check:
//!
//! - [`UptimeLogRow`]: the persisted record (`uptime_logs` table)
//! - [`CheckEvent`]: the message published for live-update relays
//!
//! Both are derived from a [`CheckResult`], the relay message keeps the
//! camelCase field names that relay consumers expect.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{CheckResult, CheckStatus, EntityId};

/// A single persisted check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeLogRow {
    pub entity_id: EntityId,
    pub status: CheckStatus,
    pub response_time_ms: Option<u64>,
    pub checked_at: DateTime<Utc>,
    pub error_reason: Option<String>,
}

impl UptimeLogRow {
    pub fn from_result(result: &CheckResult) -> Self {
        Self {
            entity_id: result.entity_id,
            status: result.status,
            response_time_ms: result.response_time_ms,
            checked_at: result.checked_at,
            error_reason: result.error_reason.clone(),
        }
    }
}

/// Message published on the live-update channel, one per persisted result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckEvent {
    pub entity_id: EntityId,
    pub url: String,
    pub status: CheckStatus,
    pub response_time: Option<u64>,
    pub error_reason: Option<String>,
    #[serde(rename = "checked_at")]
    pub checked_at: DateTime<Utc>,
}

impl CheckEvent {
    pub fn from_result(result: &CheckResult) -> Self {
        Self {
            entity_id: result.entity_id,
            url: result.url.clone(),
            status: result.status,
            response_time: result.response_time_ms,
            error_reason: result.error_reason.clone(),
            checked_at: result.checked_at,
        }
    }
}

/// Field names of the settings record, as written by the administrative surface
pub const FIELD_DEFAULT_INTERVAL: &str = "defaultInterval";
pub const FIELD_MAX_CONCURRENT_CHECKS: &str = "maxConcurrentChecks";
pub const FIELD_REQUEST_TIMEOUT: &str = "requestTimeout";
pub const FIELD_RETRY_ATTEMPTS: &str = "retryAttempts";

/// Complete set of tunable parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicSettings {
    pub default_interval: u64,
    pub max_concurrent_checks: usize,
    #[serde(rename = "requestTimeout")]
    pub request_timeout_ms: u64,
    pub retry_attempts: u32,
}

/// Settings as read from the store; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsRecord {
    pub default_interval: Option<u64>,
    pub max_concurrent_checks: Option<usize>,
    pub request_timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
}

impl SettingsRecord {
    /// Parse a field map, skipping (and logging) values that do not parse
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        fn field<T: std::str::FromStr>(fields: &HashMap<String, String>, key: &str) -> Option<T> {
            let raw = fields.get(key)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring unparsable setting {key}={raw:?}");
                    None
                }
            }
        }

        Self {
            default_interval: field(fields, FIELD_DEFAULT_INTERVAL),
            max_concurrent_checks: field(fields, FIELD_MAX_CONCURRENT_CHECKS),
            request_timeout_ms: field(fields, FIELD_REQUEST_TIMEOUT),
            retry_attempts: field(fields, FIELD_RETRY_ATTEMPTS),
        }
    }

    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        if let Some(v) = self.default_interval {
            fields.insert(FIELD_DEFAULT_INTERVAL.to_string(), v.to_string());
        }
        if let Some(v) = self.max_concurrent_checks {
            fields.insert(FIELD_MAX_CONCURRENT_CHECKS.to_string(), v.to_string());
        }
        if let Some(v) = self.request_timeout_ms {
            fields.insert(FIELD_REQUEST_TIMEOUT.to_string(), v.to_string());
        }
        if let Some(v) = self.retry_attempts {
            fields.insert(FIELD_RETRY_ATTEMPTS.to_string(), v.to_string());
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        *self == SettingsRecord::default()
    }
}

impl From<DynamicSettings> for SettingsRecord {
    fn from(settings: DynamicSettings) -> Self {
        Self {
            default_interval: Some(settings.default_interval),
            max_concurrent_checks: Some(settings.max_concurrent_checks),
            request_timeout_ms: Some(settings.request_timeout_ms),
            retry_attempts: Some(settings.retry_attempts),
        }
    }
}
