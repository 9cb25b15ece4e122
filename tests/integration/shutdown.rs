//! Worker shutdown: queue purge, bounded wait, full drain

use std::sync::Arc;
use std::time::{Duration, Instant};

use sitewatch::actors::{PersisterHandle, WorkerPool, shutdown_channel};
use sitewatch::config::PersisterConfig;
use sitewatch::queue::{JobQueue, MemoryQueue};
use sitewatch::storage::memory::MemoryBackend;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn manual_persister(backend: &Arc<MemoryBackend>) -> PersisterHandle {
    PersisterHandle::spawn(
        backend.clone(),
        &PersisterConfig {
            batch_size: 10_000,
            flush_interval_ms: 3_600_000,
        },
    )
}

#[tokio::test]
async fn test_shutdown_clears_queue_and_drains() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    let queue = Arc::new(MemoryQueue::new());
    for id in 0..50 {
        queue.push(&job(id, server.uri())).await.unwrap();
    }

    let settings = live_settings(2, 2000);
    let persister = manual_persister(&backend);
    let pool = WorkerPool::new(
        queue.clone(),
        Arc::new(checker_with(settings.clone())),
        persister.clone(),
        settings,
        fast_worker_config(2),
    );

    let (shutdown, token) = shutdown_channel();
    let running = tokio::spawn(pool.run(token));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.shutdown();
    let report = running.await.unwrap();

    // Two checks were in flight, the rest never left the queue
    assert_eq!(report.cleared_jobs, 48);
    assert_eq!(report.abandoned, 0);
    assert!(queue.is_empty().await.unwrap());

    // Results of the in-flight checks reached the store without a timer flush
    assert_eq!(persister.stats().await.unwrap().buffered, 0);
    assert_eq!(backend.all_results().await.len(), 2);

    persister.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_slow_checks_are_abandoned_after_grace() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&job(1, server.uri())).await.unwrap();

    let settings = live_settings(5, 30_000);
    let persister = manual_persister(&backend);
    let mut config = fast_worker_config(5);
    config.shutdown_grace_ms = 200;
    let pool = WorkerPool::new(
        queue.clone(),
        Arc::new(checker_with(settings.clone())),
        persister.clone(),
        settings,
        config,
    );
    let gauge = pool.gauge();

    let (shutdown, token) = shutdown_channel();
    let running = tokio::spawn(pool.run(token));

    let started = wait_until(Duration::from_secs(5), || {
        let gauge = gauge.clone();
        async move { gauge.active() == 1 }
    })
    .await;
    assert!(started);

    let stopping = Instant::now();
    shutdown.shutdown();
    let report = running.await.unwrap();

    assert_eq!(report.abandoned, 1);
    assert!(stopping.elapsed() < Duration::from_secs(5));
    persister.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_drain_survives_a_failed_write() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    backend.fail_next_writes(1);
    let queue = Arc::new(MemoryQueue::new());
    for id in 0..10 {
        queue.push(&job(id, server.uri())).await.unwrap();
    }

    let settings = live_settings(10, 2000);
    let persister = manual_persister(&backend);
    let pool = WorkerPool::new(
        queue.clone(),
        Arc::new(checker_with(settings.clone())),
        persister.clone(),
        settings,
        fast_worker_config(10),
    );
    let gauge = pool.gauge();

    let (shutdown, token) = shutdown_channel();
    let running = tokio::spawn(pool.run(token));

    wait_until(Duration::from_secs(10), || {
        let queue = queue.clone();
        let gauge = gauge.clone();
        async move { queue.is_empty().await.unwrap() && gauge.active() == 0 }
    })
    .await;

    shutdown.shutdown();
    running.await.unwrap();
    let stats = persister.shutdown().await.unwrap();

    assert_eq!(stats.buffered, 0);
    assert_eq!(stats.persisted, 10);
    assert_eq!(stats.dropped, 0);
    assert_eq!(backend.all_results().await.len(), 10);
}
