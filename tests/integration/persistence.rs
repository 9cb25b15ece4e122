//! SQLite-backed pipeline: shared queue file, grouped result writes

use std::sync::Arc;
use std::time::Duration;

use sitewatch::app;
use sitewatch::config::{EntitySpec, StorageConfig};
use sitewatch::queue::{JobQueue, SqliteQueue};
use sitewatch::storage::sqlite::SqliteBackend;
use sitewatch::storage::{EntityRegistry, ResultStore, SettingsRecord, SettingsSource};
use sitewatch::{CheckStatus, actors::LiveSettings};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_queue_is_shared_between_processes() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("shared.db");

    // Two independent pools on one file, as a scheduler and a worker process would have
    let producer = SqliteQueue::new(SqliteBackend::new(&db).await.unwrap().pool());
    let consumer = Arc::new(SqliteQueue::new(SqliteBackend::new(&db).await.unwrap().pool()));

    for id in 0..200 {
        producer
            .push(&job(id, format!("https://site-{id}.example")))
            .await
            .unwrap();
    }

    let mut tasks = vec![];
    for _ in 0..4 {
        let consumer = consumer.clone();
        tasks.push(tokio::spawn(async move {
            let mut ids = vec![];
            while let Some(job) = consumer.pop().await.unwrap() {
                ids.push(job.entity_id);
            }
            ids
        }));
    }

    let mut ids = vec![];
    for task in tasks {
        ids.extend(task.await.unwrap());
    }
    assert_each_id_once(ids, 200);
    assert!(producer.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_worker_persists_to_sqlite() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("sitewatch.db");
    let storage = StorageConfig::Sqlite { path: db.clone() };

    let services = app::open_services(&storage).await.unwrap();
    for id in 0..20 {
        services.queue.push(&job(id, server.uri())).await.unwrap();
    }

    let config = fast_config(5);
    let worker = app::start_worker(&services, &config, live_settings(5, 2000)).unwrap();

    let queue = services.queue.clone();
    wait_until(Duration::from_secs(10), || {
        let queue = queue.clone();
        async move { queue.is_empty().await.unwrap() }
    })
    .await;

    // Stopping drains the persister before the database is closed
    let report = worker.stop().await.unwrap();
    assert_eq!(report.summary.total, 20);

    let reader = SqliteBackend::new(&db).await.unwrap();
    for id in 0..20 {
        let rows = reader.latest_results(id, 10).await.unwrap();
        assert_eq!(rows.len(), 1, "entity {id}");
        assert_eq!(rows[0].status, CheckStatus::Down);
        assert_eq!(rows[0].error_reason.as_deref(), Some("HTTP 404"));
    }
}

#[tokio::test]
async fn test_settings_and_seeding_round_through_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageConfig::Sqlite {
        path: dir.path().join("settings.db"),
    };
    let services = app::open_services(&storage).await.unwrap();

    services
        .settings
        .store_settings(&SettingsRecord {
            default_interval: Some(120),
            max_concurrent_checks: Some(25),
            ..SettingsRecord::default()
        })
        .await
        .unwrap();

    let config = fast_config(200);
    let live = Arc::new(LiveSettings::from_config(&config));
    let sync = app::start_settings_sync(&services, &config, live.clone()).await;

    assert_eq!(live.max_concurrent(), 25);
    assert_eq!(live.default_interval(), 120);
    assert_eq!(live.request_timeout(), Duration::from_millis(2000));

    let specs: Vec<EntitySpec> = serde_json::from_str(
        r#"[{"id": 1, "url": "https://example.com"}, {"id": 2, "url": "https://example.org", "interval_seconds": 30}]"#,
    )
    .unwrap();
    app::seed_entities(services.registry.as_ref(), &specs, live.default_interval())
        .await
        .unwrap();

    let entities = services.registry.load_schedulable().await.unwrap();
    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].interval_seconds, 120);
    assert_eq!(entities[1].interval_seconds, 30);

    sync.shutdown().await.unwrap();
}
