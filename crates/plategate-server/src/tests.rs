use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use plategate_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use plategate_dispatch::Envelope;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::handlers::PLATE_SCANNED_EVENT;
use crate::{app, AppState};

const TEST_API_KEY: &str = "test-webhook-key";

fn test_state() -> (tempfile::TempDir, DbPool, Router) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("server-test.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default())
        .expect("pool creation should succeed");
    run_migrations(&pool.get().unwrap()).expect("migrations should succeed");

    let state = AppState {
        pool: pool.clone(),
        bus: None,
        events_channel: "events".to_string(),
        webhook_api_key: TEST_API_KEY.to_string(),
    };
    (dir, pool, app(state, "/api/licenseplate"))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_service_and_version() {
    let (_dir, _pool, app) = test_state();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "plategate");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn scan_registers_record_and_enqueues_outbox_event() {
    let (_dir, pool, app) = test_state();

    let response = app
        .oneshot(post_json(
            "/api/licenseplate/scan",
            &json!({"plate_number": "abc 123", "guest_name": "Jane Doe"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["record"]["plate_number"], "ABC123");
    assert_eq!(body["record"]["visitor_type"], "guest");

    // The record upsert and the outbox insert commit together.
    let conn = pool.get().unwrap();
    let pending = plategate_outbox::fetch_pending(&conn, 10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].channel, "events");

    let envelope = Envelope::parse(&pending[0].payload).unwrap();
    assert_eq!(envelope.event_type, PLATE_SCANNED_EVENT);
    assert_eq!(envelope.record["plate_number"], "ABC123");
}

#[tokio::test]
async fn scan_with_missing_plate_is_rejected_atomically() {
    let (_dir, pool, app) = test_state();

    let response = app
        .oneshot(post_json(
            "/api/licenseplate/scan",
            &json!({"plate_number": "  ", "guest_name": "Jane Doe"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let conn = pool.get().unwrap();
    assert_eq!(plategate_outbox::count_pending(&conn).unwrap(), 0);
}

#[tokio::test]
async fn unknown_record_is_404() {
    let (_dir, _pool, app) = test_state();

    let response = app
        .oneshot(get("/api/licenseplate/records/NOPE"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn record_lifecycle_over_http() {
    let (_dir, _pool, app) = test_state();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/licenseplate/scan",
            &json!({"plate_number": "XYZ789", "guest_name": "Sam Porter", "visitor_type": "staff"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(get("/api/licenseplate/records?search=xyz"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["records"][0]["plate_number"], "XYZ789");

    // Lookup normalizes the path segment too.
    let response = app
        .clone()
        .oneshot(get("/api/licenseplate/records/xyz789"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["visitor_type"], "staff");

    let response = app
        .clone()
        .oneshot(delete("/api/licenseplate/records/XYZ789"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get("/api/licenseplate/records/XYZ789"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_requires_valid_api_key() {
    let (_dir, pool, app) = test_state();
    let scan = json!({"event_type": "entry", "plate_number": "KEY111"});

    let response = app
        .clone()
        .oneshot(post_json("/api/licenseplate/webhook/scan", &scan))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json("/api/licenseplate/webhook/scan", &scan);
    request
        .headers_mut()
        .insert("authorization", "Bearer wrong-key".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let conn = pool.get().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM parking_events", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0, "rejected webhooks leave no trace");
}

#[tokio::test]
async fn webhook_scan_logs_event_and_auto_registers() {
    let (_dir, pool, app) = test_state();

    let mut request = post_json(
        "/api/licenseplate/webhook/scan",
        &json!({
            "event_type": "entry",
            "plate_number": "new 999",
            "location": "north gate",
            "confidence": 0.97
        }),
    );
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {TEST_API_KEY}").parse().unwrap(),
    );

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["plate_number"], "NEW999");

    let conn = pool.get().unwrap();
    let events = plategate_records::list_parking_events(&conn, "NEW999").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "entry");

    let record = plategate_records::get_record(&conn, "NEW999").unwrap();
    assert_eq!(record.guest_name, "Unknown Guest (Auto-detected)");
    assert_eq!(record.visitor_type, "visitor");

    // The webhook path processes directly; only /scan feeds the outbox.
    assert_eq!(plategate_outbox::count_pending(&conn).unwrap(), 0);

    let response = app
        .oneshot(get("/api/licenseplate/records/NEW999/events"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["plate_number"], "NEW999");
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn webhook_info_describes_the_contract_without_auth() {
    let (_dir, _pool, app) = test_state();

    let response = app
        .oneshot(get("/api/licenseplate/webhook/scan"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["authentication"]["type"], "API Key");
    assert_eq!(body["payload_example"]["event_type"], "entry");
    assert!(
        !body.to_string().contains(TEST_API_KEY),
        "the info endpoint must never leak the configured key"
    );
}

#[tokio::test]
async fn webhook_rejects_scan_without_plate() {
    let (_dir, _pool, app) = test_state();

    let mut request = post_json(
        "/api/licenseplate/webhook/scan",
        &json!({"event_type": "entry"}),
    );
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {TEST_API_KEY}").parse().unwrap(),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}
