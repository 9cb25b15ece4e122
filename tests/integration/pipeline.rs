//! Queue → worker pool → persister, end to end over the in-memory backend

use std::sync::Arc;
use std::time::Duration;

use sitewatch::actors::{PersisterHandle, Scheduler, SchedulerHandle, WorkerPool, shutdown_channel};
use sitewatch::app::{self, Services};
use sitewatch::config::PersisterConfig;
use sitewatch::queue::{JobQueue, MemoryQueue};
use sitewatch::storage::memory::MemoryBackend;
use sitewatch::{CheckStatus, MonitoredEntity};
use wiremock::matchers::{any, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn services(backend: &Arc<MemoryBackend>, queue: &Arc<MemoryQueue>) -> Services {
    Services {
        results: backend.clone(),
        registry: backend.clone(),
        settings: backend.clone(),
        queue: queue.clone(),
    }
}

#[tokio::test]
async fn test_every_job_yields_exactly_one_result() {
    let server = MockServer::start().await;
    Mock::given(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    let queue = Arc::new(MemoryQueue::new());
    let jobs = 60;
    for id in 0..jobs {
        let url = if id % 3 == 0 {
            format!("{}/down", server.uri())
        } else {
            format!("{}/site/{id}", server.uri())
        };
        queue.push(&job(id as i64, url)).await.unwrap();
    }

    let config = fast_config(8);
    let worker =
        app::start_worker(&services(&backend, &queue), &config, live_settings(8, 2000)).unwrap();

    let done = wait_until(Duration::from_secs(10), || {
        let backend = backend.clone();
        async move { backend.all_results().await.len() >= jobs }
    })
    .await;
    assert!(done, "not all results were persisted");

    worker.stop().await.unwrap();

    let rows = backend.all_results().await;
    assert_each_id_once(rows.iter().map(|row| row.entity_id).collect(), jobs);

    for row in &rows {
        if row.entity_id % 3 == 0 {
            assert_eq!(row.status, CheckStatus::Down);
            assert_eq!(row.error_reason.as_deref(), Some("HTTP 503"));
        } else {
            assert_eq!(row.status, CheckStatus::Up);
        }
    }
}

#[tokio::test]
async fn test_concurrency_stays_within_ceiling() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    let queue = Arc::new(MemoryQueue::new());
    let jobs = 30;
    for id in 0..jobs {
        queue.push(&job(id as i64, server.uri())).await.unwrap();
    }

    let settings = live_settings(4, 2000);
    let persister = PersisterHandle::spawn(
        backend.clone(),
        &PersisterConfig {
            batch_size: 10,
            flush_interval_ms: 50,
        },
    );
    let pool = WorkerPool::new(
        queue.clone(),
        Arc::new(checker_with(settings.clone())),
        persister.clone(),
        settings,
        fast_worker_config(4),
    );
    let gauge = pool.gauge();

    let (shutdown, token) = shutdown_channel();
    let running = tokio::spawn(pool.run(token));

    let done = wait_until(Duration::from_secs(10), || {
        let backend = backend.clone();
        async move { backend.all_results().await.len() >= jobs }
    })
    .await;
    assert!(done, "not all results were persisted");

    shutdown.shutdown();
    let report = running.await.unwrap();
    persister.shutdown().await.unwrap();

    assert!(gauge.peak() <= 4, "peak concurrency {} above ceiling", gauge.peak());
    assert!(gauge.peak() >= 2, "checks never overlapped");
    assert_eq!(report.summary.total, jobs as u64);
    assert_eq!(report.abandoned, 0);
}

#[tokio::test]
async fn test_lowered_ceiling_is_honoured() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    let queue = Arc::new(MemoryQueue::new());

    let settings = live_settings(10, 2000);
    // Lowered before the pool starts pulling
    settings.set_max_concurrent(1);

    let persister = PersisterHandle::spawn(backend.clone(), &PersisterConfig::default());
    let pool = WorkerPool::new(
        queue.clone(),
        Arc::new(checker_with(settings.clone())),
        persister.clone(),
        settings,
        fast_worker_config(10),
    );
    let gauge = pool.gauge();

    for id in 0..5 {
        queue.push(&job(id, server.uri())).await.unwrap();
    }

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
    persister.shutdown().await.unwrap();

    assert_eq!(gauge.peak(), 1);
    assert_eq!(backend.all_results().await.len(), 5);
}

#[tokio::test]
async fn test_scheduler_to_store() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let entities = (0..5)
        .map(|id| MonitoredEntity {
            id,
            url: format!("{}/{id}", server.uri()),
            name: Some(format!("site {id}")),
            interval_seconds: 3600,
            notification_target: None,
        })
        .collect();
    let backend = Arc::new(MemoryBackend::with_entities(entities));
    let queue = Arc::new(MemoryQueue::new());
    let services = services(&backend, &queue);

    let config = fast_config(10);
    let worker = app::start_worker(&services, &config, live_settings(10, 2000)).unwrap();
    let mut events = worker.persister.subscribe();

    let scheduler = SchedulerHandle::spawn(
        Scheduler::new(services.registry.clone(), services.queue.clone()),
        Duration::from_secs(3600),
    );
    // Together with the immediate first tick, still one job per entity
    scheduler.run_now().await.unwrap();

    let mut seen = vec![];
    for _ in 0..5 {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, CheckStatus::Up);
        seen.push(event.entity_id);
    }
    assert_each_id_once(seen, 5);

    scheduler.shutdown().await.unwrap();
    worker.stop().await.unwrap();
    assert_eq!(backend.all_results().await.len(), 5);
}
