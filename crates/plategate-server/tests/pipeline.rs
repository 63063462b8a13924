//! End-to-end delivery pipeline test: HTTP scan -> outbox -> publisher ->
//! bus -> listener -> dispatcher -> handler -> parking event.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use plategate_bus::{BroadcastBus, EventBus};
use plategate_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use plategate_dispatch::{spawn_listener, Dispatcher};
use plategate_outbox::{OutboxPublisher, OutboxStatus, PublisherConfig};
use plategate_server::handlers::PlateScannedHandler;
use plategate_server::{app, AppState};
use serde_json::json;
use tower::ServiceExt;

const CHANNEL: &str = "events";

fn test_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("pipeline-test.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default())
        .expect("pool creation should succeed");
    run_migrations(&pool.get().unwrap()).expect("migrations should succeed");
    (dir, pool)
}

async fn wait_until(mut probe: impl FnMut() -> bool) {
    for _ in 0..200 {
        if probe() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scan_flows_from_http_to_parking_event() {
    let (_dir, pool) = test_pool();
    let bus: Arc<dyn EventBus> = Arc::new(BroadcastBus::default());

    // Consumer side: listener feeding the scan handler.
    let dispatcher = Arc::new(
        Dispatcher::new(4).register(Arc::new(PlateScannedHandler::new(pool.clone()))),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let listener = spawn_listener(
        Arc::clone(&bus),
        CHANNEL.to_string(),
        dispatcher,
        shutdown_rx,
    );

    // Producer side: the scan endpoint writes the record and the outbox row
    // in one transaction.
    let state = AppState {
        pool: pool.clone(),
        bus: Some(Arc::clone(&bus)),
        events_channel: CHANNEL.to_string(),
        webhook_api_key: "unused".to_string(),
    };
    let response = app(state, "/api/licenseplate")
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/licenseplate/scan")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"plate_number": "E2E777", "guest_name": "Robin Eaves"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Nothing reaches the handler until the publisher drains the outbox.
    {
        let conn = pool.get().unwrap();
        assert_eq!(plategate_outbox::count_pending(&conn).unwrap(), 1);
        assert!(plategate_records::list_parking_events(&conn, "E2E777")
            .unwrap()
            .is_empty());
    }

    let publisher = OutboxPublisher::new(pool.clone(), Arc::clone(&bus), PublisherConfig::default());
    let stats = publisher.drain_once().expect("drain should succeed");
    assert_eq!(stats.published, 1);

    let probe_pool = pool.clone();
    wait_until(move || {
        let conn = probe_pool.get().unwrap();
        !plategate_records::list_parking_events(&conn, "E2E777")
            .unwrap()
            .is_empty()
    })
    .await;

    let conn = pool.get().unwrap();
    let events = plategate_records::list_parking_events(&conn, "E2E777").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "entry");

    // The outbox row is spent, so the next tick republishes nothing.
    assert_eq!(plategate_outbox::count_pending(&conn).unwrap(), 0);
    let event = plategate_outbox::get_event(&conn, 1).unwrap();
    assert_eq!(event.status(), OutboxStatus::Sent);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .expect("listener should stop on shutdown")
        .unwrap();
}
