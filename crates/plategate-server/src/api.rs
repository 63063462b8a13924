//! HTTP handlers for the record CRUD and scan endpoints.
//!
//! The scan endpoint is the producer side of the outbox pattern: the record
//! upsert and the outbox insert happen in one transaction, so a scan that
//! was acknowledged to the caller can never lose its event. If the outbox
//! insert itself fails the record still commits and a best-effort direct
//! bus publish is attempted instead (not covered by the delivery guarantee).

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use plategate_dispatch::Envelope;
use plategate_records::{
    delete_record, get_record, list_parking_events, list_records, upsert_record,
    LicensePlateRecord, RecordError, ScanRequest, SearchFilters,
};
use serde_json::{json, Value};

use crate::handlers::PLATE_SCANNED_EVENT;
use crate::AppState;

type ApiError = (StatusCode, Json<Value>);

/// Maps a [`RecordError`] to an HTTP response, logging store failures.
fn record_err_response(e: RecordError) -> ApiError {
    match e {
        RecordError::NotFound(plate) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("record not found: {plate}")})),
        ),
        RecordError::InvalidInput(message) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
        }
        RecordError::Database(err) => {
            tracing::error!(error = %err, "record operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal server error"})),
            )
        }
    }
}

/// Logs an unexpected failure and maps it to a bare 500.
fn internal_error<E: std::fmt::Display>(e: E) -> ApiError {
    tracing::error!("internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
}

/// POST /scan
///
/// Registers (or re-registers) a plate and enqueues a
/// `licenseplate.scanned` event in the same transaction.
pub async fn scan_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<ScanRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let pool = state.pool.clone();
    let channel = state.events_channel.clone();

    type ScanOutcome = (LicensePlateRecord, String, Option<String>);
    let (record, payload, outbox_error): ScanOutcome =
        tokio::task::spawn_blocking(move || -> Result<ScanOutcome, ApiError> {
            let conn = pool.get().map_err(internal_error)?;
            let tx = conn.unchecked_transaction().map_err(internal_error)?;

            let record = upsert_record(&tx, &req).map_err(record_err_response)?;

            let record_json = serde_json::to_value(&record).map_err(internal_error)?;
            let payload = Envelope::new(PLATE_SCANNED_EVENT, record_json)
                .to_payload()
                .map_err(internal_error)?;

            // A failed outbox insert must not roll back the record; the
            // caller falls back to a direct publish below.
            let outbox_error = plategate_outbox::insert_event(&tx, &channel, &payload)
                .err()
                .map(|e| e.to_string());

            tx.commit().map_err(internal_error)?;
            Ok((record, payload, outbox_error))
        })
        .await
        .map_err(internal_error)??;

    if let Some(err) = outbox_error {
        tracing::warn!(
            plate = %record.plate_number,
            "outbox insert failed, falling back to direct publish: {}",
            err
        );
        if let Some(bus) = &state.bus {
            if let Err(e) = bus.publish(&state.events_channel, &payload) {
                tracing::error!(plate = %record.plate_number, "fallback publish failed: {}", e);
            }
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "License plate scanned successfully",
            "record": record,
        })),
    ))
}

/// GET /records
pub async fn list_records_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(filters): Query<SearchFilters>,
) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    let records = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(internal_error)?;
        list_records(&conn, &filters).map_err(record_err_response)
    })
    .await
    .map_err(internal_error)??;

    Ok(Json(json!({
        "count": records.len(),
        "records": records,
    })))
}

/// GET /records/{plate}
pub async fn get_record_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(plate): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    let record = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(internal_error)?;
        get_record(&conn, &plate).map_err(record_err_response)
    })
    .await
    .map_err(internal_error)??;

    Ok(Json(serde_json::to_value(record).map_err(internal_error)?))
}

/// DELETE /records/{plate}
pub async fn delete_record_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(plate): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(internal_error)?;
        delete_record(&conn, &plate).map_err(record_err_response)
    })
    .await
    .map_err(internal_error)??;

    Ok(Json(json!({"message": "Record deleted successfully"})))
}

/// GET /records/{plate}/events
pub async fn parking_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(plate): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    let plate_for_query = plate.clone();
    let events = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(internal_error)?;
        list_parking_events(&conn, &plate_for_query).map_err(record_err_response)
    })
    .await
    .map_err(internal_error)??;

    Ok(Json(json!({
        "plate_number": plategate_records::normalize_plate(&plate),
        "count": events.len(),
        "events": events,
    })))
}
