//! Camera webhook endpoint.
//!
//! Gate cameras POST scan payloads here. The handler authenticates via a
//! bearer token, logs the entry/exit event, and auto-registers vehicles
//! never seen before. Processing is synchronous from the camera's point of
//! view — the acknowledgment means the scan is durably recorded.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use plategate_records::{process_scan, RecordError, ScanEvent};
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

/// Acknowledgment sent back to the camera.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate_number: Option<String>,
}

fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<WebhookResponse>) {
    (
        status,
        Json(WebhookResponse {
            success: false,
            message: message.to_string(),
            plate_number: None,
        }),
    )
}

/// Extracts the bearer token from the Authorization header.
///
/// Both `Bearer TOKEN` and a bare `TOKEN` are accepted, matching what the
/// camera vendors actually send.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

/// POST /webhook/scan
pub async fn scan_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(scan): Json<ScanEvent>,
) -> Result<Json<WebhookResponse>, (StatusCode, Json<WebhookResponse>)> {
    match bearer_token(&headers) {
        None => return Err(reject(StatusCode::UNAUTHORIZED, "Missing Authorization header")),
        Some(token) if token != state.webhook_api_key => {
            return Err(reject(StatusCode::UNAUTHORIZED, "Invalid API key"));
        }
        Some(_) => {}
    }

    tracing::info!(
        event_type = %scan.event_type,
        plate = %scan.plate_number,
        location = scan.location.as_deref().unwrap_or(""),
        "received camera webhook"
    );

    let plate = plategate_records::normalize_plate(&scan.plate_number);
    let event_type = scan.event_type.clone();
    let pool = state.pool.clone();

    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| {
            tracing::error!("webhook pool error: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        })?;
        process_scan(&conn, &scan).map_err(|e| match e {
            RecordError::InvalidInput(message) => reject(StatusCode::BAD_REQUEST, &message),
            other => {
                tracing::error!("webhook processing failed: {}", other);
                reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process webhook")
            }
        })
    })
    .await
    .map_err(|e| {
        tracing::error!("webhook join error: {}", e);
        reject(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    })??;

    Ok(Json(WebhookResponse {
        success: true,
        message: format!("Successfully processed {event_type} event for plate {plate}"),
        plate_number: Some(plate),
    }))
}

/// GET /webhook/scan
///
/// Self-describing documentation for camera integrators: the auth header
/// and payload shape the POST endpoint expects. Unauthenticated — it
/// reveals the contract, never the key.
pub async fn webhook_info_handler() -> Json<Value> {
    Json(json!({
        "endpoint": "/webhook/scan",
        "method": "POST",
        "authentication": {
            "type": "API Key",
            "header": "Authorization: Bearer YOUR_API_KEY",
        },
        "payload_example": {
            "event_type": "entry",
            "plate_number": "ABC-123",
            "location": "Main Gate",
            "confidence": 0.98,
            "camera_id": "CAM-001",
            "direction": "in",
        },
        "response_example": WebhookResponse {
            success: true,
            message: "Successfully processed entry event for plate ABC123".to_string(),
            plate_number: Some("ABC123".to_string()),
        },
    }))
}
