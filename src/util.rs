use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use crate::config::{Config, StorageConfig};

const DATABASE_PATH: &str = "SITEWATCH_DB";

const MAX_CONCURRENT: &str = "MAX_CONCURRENT";

const BATCH_SIZE: &str = "BATCH_SIZE";

const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let value_from_env = std::env::var(key);
    value_from_env.ok().and_then(|res| res.parse().ok())
}

pub fn get_database_path() -> Option<PathBuf> {
    std::env::var(DATABASE_PATH).ok().map(PathBuf::from)
}

pub fn get_max_concurrent() -> Option<usize> {
    env_parse(MAX_CONCURRENT).filter(|max| *max > 0)
}

pub fn get_batch_size() -> Option<usize> {
    env_parse(BATCH_SIZE).filter(|size| *size > 0)
}

pub fn get_request_timeout() -> Option<u64> {
    env_parse(REQUEST_TIMEOUT).filter(|timeout| *timeout > 0)
}

/// Environment wins over the configuration file for the deployment knobs
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(path) = get_database_path() {
        debug!("database path overridden from environment: {}", path.display());
        config.storage = StorageConfig::Sqlite { path };
    }

    if let Some(max) = get_max_concurrent() {
        config.worker.max_concurrent = max;
    }

    if let Some(size) = get_batch_size() {
        config.worker.batch_size = size;
    }

    if let Some(timeout) = get_request_timeout() {
        config.worker.request_timeout_ms = timeout;
    }
}
