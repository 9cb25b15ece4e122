//! Helper functions for integration tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sitewatch::actors::LiveSettings;
use sitewatch::config::{Config, HttpConfig, PersisterConfig, WorkerConfig};
use sitewatch::monitors::{HealthChecker, TcpProbe};
use sitewatch::net::{ConnectionPool, DnsCache};
use sitewatch::storage::DynamicSettings;
use sitewatch::{EntityId, Job};
use tokio::net::TcpListener;

pub fn live_settings(max_concurrent: usize, request_timeout_ms: u64) -> Arc<LiveSettings> {
    Arc::new(LiveSettings::new(DynamicSettings {
        default_interval: 60,
        max_concurrent_checks: max_concurrent,
        request_timeout_ms,
        retry_attempts: 3,
    }))
}

/// Checker plus the DNS cache its client and TCP probe resolve through
///
/// `tcp_port` replaces both standard ports of the TCP fallback probe.
pub fn checker_parts(
    settings: Arc<LiveSettings>,
    tcp_port: Option<u16>,
) -> (HealthChecker, DnsCache) {
    let dns = DnsCache::new(Duration::from_secs(3600));
    let pool = ConnectionPool::new(&HttpConfig::default(), &dns).unwrap();
    let mut tcp = TcpProbe::new(Duration::from_millis(500), dns.clone());
    if let Some(port) = tcp_port {
        tcp = tcp.with_ports(port, port);
    }
    (HealthChecker::new(pool, tcp, settings), dns)
}

pub fn checker_with(settings: Arc<LiveSettings>) -> HealthChecker {
    checker_parts(settings, None).0
}

pub fn checker(request_timeout_ms: u64) -> HealthChecker {
    checker_with(live_settings(10, request_timeout_ms))
}

/// Checker whose TCP fallback probe targets `tcp_port`
pub fn tcp_checker(request_timeout_ms: u64, tcp_port: u16) -> HealthChecker {
    checker_parts(live_settings(10, request_timeout_ms), Some(tcp_port)).0
}

pub fn job(entity_id: i64, url: impl Into<String>) -> Job {
    Job {
        entity_id,
        url: url.into(),
        name: None,
    }
}

/// Worker settings with short waits so tests stay fast
pub fn fast_worker_config(max_concurrent: usize) -> WorkerConfig {
    WorkerConfig {
        max_concurrent,
        batch_size: 100,
        request_timeout_ms: 2000,
        full_wait_ms: 5,
        idle_wait_ms: 20,
        shutdown_grace_ms: 2000,
        summary_interval_secs: 60,
    }
}

pub fn fast_config(max_concurrent: usize) -> Config {
    Config {
        worker: fast_worker_config(max_concurrent),
        persister: PersisterConfig {
            batch_size: 100,
            flush_interval_ms: 50,
        },
        ..Config::default()
    }
}

/// A port on which nothing listens
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Accepts TCP connections and closes them immediately, never speaking HTTP
pub async fn hangup_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    addr
}

/// Poll `probe` until it returns true or the timeout elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    probe().await
}

/// Every id in `0..jobs` appears exactly once
pub fn assert_each_id_once(mut ids: Vec<EntityId>, jobs: usize) {
    ids.sort();
    assert_eq!(ids, (0..jobs as EntityId).collect::<Vec<_>>());
}
