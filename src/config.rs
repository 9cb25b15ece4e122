use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory registry, queue and result store (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database shared by scheduler and worker processes
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./sitewatch.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub persister: PersisterConfig,

    #[serde(default)]
    pub settings: SettingsSyncConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub http: HttpConfig,

    /// Entities seeded into the registry on startup
    pub entities: Option<Vec<EntitySpec>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SchedulerConfig {
    /// Resolution of the dispatch loop, must stay below the smallest interval
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }
}

fn default_tick_secs() -> u64 {
    10
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct WorkerConfig {
    /// Initial concurrency ceiling, until the first settings sync
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Upper bound of jobs pulled from the queue per loop iteration
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Initial per-request timeout, until the first settings sync
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Re-check delay while the pool is saturated
    #[serde(default = "default_full_wait_ms")]
    pub full_wait_ms: u64,

    /// Back-off delay when the queue was empty
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,

    /// How long shutdown waits for in-flight probes
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            batch_size: default_batch_size(),
            request_timeout_ms: default_request_timeout_ms(),
            full_wait_ms: default_full_wait_ms(),
            idle_wait_ms: default_idle_wait_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            summary_interval_secs: default_summary_interval_secs(),
        }
    }
}

fn default_max_concurrent() -> usize {
    200
}

fn default_batch_size() -> usize {
    100
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_full_wait_ms() -> u64 {
    10
}

fn default_idle_wait_ms() -> u64 {
    500
}

fn default_shutdown_grace_ms() -> u64 {
    3000
}

fn default_summary_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PersisterConfig {
    /// Flush as soon as this many results are buffered
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush at least this often
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

fn default_flush_interval_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SettingsSyncConfig {
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Value handed to seeded entities that declare no interval
    #[serde(default = "default_interval")]
    pub default_interval: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

impl Default for SettingsSyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            default_interval: default_interval(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_interval() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_dns_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_dns_ttl_secs(),
        }
    }
}

fn default_dns_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Timeout of the raw TCP fallback probe
    #[serde(default = "default_tcp_timeout_ms")]
    pub tcp_timeout_ms: u64,

    /// Port of the TCP fallback probe for non-https URLs
    #[serde(default = "default_tcp_plain_port")]
    pub tcp_plain_port: u16,

    /// Port of the TCP fallback probe for https URLs
    #[serde(default = "default_tcp_secure_port")]
    pub tcp_secure_port: u16,

    /// Route probes through HTTP(S)_PROXY when set
    #[serde(default)]
    pub use_system_proxy: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: default_max_connections_per_host(),
            keep_alive_secs: default_keep_alive_secs(),
            max_redirects: default_max_redirects(),
            tcp_timeout_ms: default_tcp_timeout_ms(),
            tcp_plain_port: default_tcp_plain_port(),
            tcp_secure_port: default_tcp_secure_port(),
            use_system_proxy: false,
        }
    }
}

fn default_max_connections_per_host() -> usize {
    200
}

fn default_keep_alive_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    5
}

fn default_tcp_plain_port() -> u16 {
    crate::monitors::tcp::DEFAULT_PLAIN_PORT
}

fn default_tcp_secure_port() -> u16 {
    crate::monitors::tcp::DEFAULT_SECURE_PORT
}

fn default_tcp_timeout_ms() -> u64 {
    3000
}

/// Entity declared in the configuration file
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EntitySpec {
    pub id: crate::EntityId,
    pub url: String,
    pub name: Option<String>,
    pub interval_seconds: Option<i64>,
    pub notification_target: Option<String>,
}

impl EntitySpec {
    pub fn resolve(&self, default_interval: u64) -> crate::MonitoredEntity {
        crate::MonitoredEntity {
            id: self.id,
            url: self.url.clone(),
            name: self.name.clone(),
            interval_seconds: self
                .interval_seconds
                .unwrap_or(default_interval as i64),
            notification_target: self.notification_target.clone(),
        }
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

/// Load the configuration file if one was given, then apply environment overrides
pub fn load(path: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };
    crate::util::apply_env_overrides(&mut config);
    Ok(config)
}
