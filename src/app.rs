//! Process wiring shared by the binaries
//!
//! Every service (stores, queue, DNS cache, connection pool) is built once
//! here and handed to the components that need it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actors::{
    LiveSettings, PersisterHandle, Scheduler, SchedulerHandle, SettingsSyncHandle,
    ShutdownReport, ShutdownSender, WorkerPool, shutdown_channel,
};
use crate::config::{Config, EntitySpec, StorageConfig};
use crate::monitors::{HealthChecker, TcpProbe};
use crate::net::{ConnectionPool, DnsCache};
use crate::queue::{JobQueue, MemoryQueue, SqliteQueue};
use crate::storage::memory::MemoryBackend;
use crate::storage::sqlite::SqliteBackend;
use crate::storage::{EntityRegistry, ResultStore, SettingsSource};

/// The external collaborators of the pipeline
#[derive(Clone)]
pub struct Services {
    pub results: Arc<dyn ResultStore>,
    pub registry: Arc<dyn EntityRegistry>,
    pub settings: Arc<dyn SettingsSource>,
    pub queue: Arc<dyn JobQueue>,
}

impl Services {
    /// Everything in memory, nothing shared with other processes
    pub fn in_memory() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        Self {
            results: backend.clone(),
            registry: backend.clone(),
            settings: backend,
            queue: Arc::new(MemoryQueue::new()),
        }
    }
}

/// Open the configured backend; failure here is fatal for the process
pub async fn open_services(config: &StorageConfig) -> Result<Services> {
    match config {
        StorageConfig::None => {
            warn!("running without a database, nothing is shared between processes");
            Ok(Services::in_memory())
        }
        StorageConfig::Sqlite { path } => {
            let backend = Arc::new(
                SqliteBackend::new(path)
                    .await
                    .with_context(|| format!("failed to open database {}", path.display()))?,
            );
            info!("using database {}", path.display());

            Ok(Services {
                results: backend.clone(),
                registry: backend.clone(),
                settings: backend.clone(),
                queue: Arc::new(SqliteQueue::new(backend.pool())),
            })
        }
    }
}

/// Write the configured entities into the registry
///
/// Entities without an interval get the current default interval.
pub async fn seed_entities(
    registry: &dyn EntityRegistry,
    entities: &[EntitySpec],
    default_interval: u64,
) -> Result<usize> {
    if entities.is_empty() {
        return Ok(0);
    }

    let resolved: Vec<_> = entities
        .iter()
        .map(|spec| spec.resolve(default_interval))
        .collect();

    let seeded = registry
        .upsert_entities(&resolved)
        .await
        .context("failed to seed entities")?;
    info!("seeded {seeded} entities into the registry");
    Ok(seeded)
}

/// Start the settings sync and wait for its first read
pub async fn start_settings_sync(
    services: &Services,
    config: &Config,
    live: Arc<LiveSettings>,
) -> SettingsSyncHandle {
    let handle = SettingsSyncHandle::spawn(
        services.settings.clone(),
        live,
        Duration::from_secs(config.settings.sync_interval_secs.max(1)),
    );

    match handle.sync_now().await {
        Ok(settings) => debug!("initial settings: {settings:?}"),
        Err(e) => warn!("initial settings sync failed, using configured values: {e:#}"),
    }

    handle
}

pub fn start_scheduler(services: &Services, config: &Config) -> SchedulerHandle {
    let scheduler = Scheduler::new(services.registry.clone(), services.queue.clone());
    SchedulerHandle::spawn(scheduler, config.scheduler.tick())
}

/// A running worker pool together with its persister
pub struct WorkerRuntime {
    pub persister: PersisterHandle,
    shutdown: ShutdownSender,
    pool: JoinHandle<ShutdownReport>,
}

impl WorkerRuntime {
    /// Stop pulling, drain and close the result store
    pub async fn stop(self) -> Result<ShutdownReport> {
        self.shutdown.shutdown();

        let report = self.pool.await.context("worker pool task failed")?;
        let stats = self.persister.shutdown().await?;
        info!(
            "worker stopped: {} results persisted, {} dropped, {} queued jobs cleared, {} checks abandoned",
            stats.persisted, stats.dropped, report.cleared_jobs, report.abandoned
        );

        Ok(report)
    }
}

pub fn start_worker(
    services: &Services,
    config: &Config,
    live: Arc<LiveSettings>,
) -> Result<WorkerRuntime> {
    let dns = DnsCache::new(Duration::from_secs(config.dns.ttl_secs));
    let pool = ConnectionPool::new(&config.http, &dns).context("failed to build HTTP client")?;
    let tcp = TcpProbe::new(Duration::from_millis(config.http.tcp_timeout_ms), dns)
        .with_ports(config.http.tcp_plain_port, config.http.tcp_secure_port);
    let checker = Arc::new(HealthChecker::new(pool, tcp, live.clone()));

    let persister = PersisterHandle::spawn(services.results.clone(), &config.persister);

    let worker_pool = WorkerPool::new(
        services.queue.clone(),
        checker,
        persister.clone(),
        live,
        config.worker.clone(),
    );

    let (shutdown, token) = shutdown_channel();
    let pool = tokio::spawn(worker_pool.run(token));

    Ok(WorkerRuntime {
        persister,
        shutdown,
        pool,
    })
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
