//! Plategate server library logic.

pub mod api;
pub mod api_webhook;
pub mod broker;
pub mod config;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use plategate_bus::EventBus;
use plategate_db::DbPool;
use plategate_dispatch::RequeueSink;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Event bus, when enabled. `None` disables the producer fallback
    /// publish; the outbox insert itself never depends on the bus.
    pub bus: Option<Arc<dyn EventBus>>,
    /// Bus channel that scan events are published on.
    pub events_channel: String,
    /// Bearer token expected on camera webhook calls.
    pub webhook_api_key: String,
}

/// Feeds messages whose handler failed back into the outbox, so the
/// publisher delivers them again on a later tick.
pub struct OutboxRequeueSink {
    pool: DbPool,
}

impl OutboxRequeueSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl RequeueSink for OutboxRequeueSink {
    fn requeue(
        &self,
        channel: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let conn = self.pool.get()?;
        plategate_outbox::insert_event(&conn, channel, payload)?;
        Ok(())
    }
}

/// Health check handler.
///
/// Returns `200 OK` with service status and version. Used by the broker,
/// monitoring, and CI to verify the plugin is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "plategate",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
///
/// `base_api_route` prefixes the plugin API (default `/api/licenseplate`);
/// `/health` stays at the root so the broker can probe it unprefixed.
pub fn app(state: AppState, base_api_route: &str) -> Router {
    let api = Router::new()
        .route("/scan", post(api::scan_handler))
        .route(
            "/records",
            get(api::list_records_handler),
        )
        .route(
            "/records/{plate}",
            get(api::get_record_handler).delete(api::delete_record_handler),
        )
        .route(
            "/records/{plate}/events",
            get(api::parking_events_handler),
        )
        .route(
            "/webhook/scan",
            post(api_webhook::scan_webhook_handler).get(api_webhook::webhook_info_handler),
        );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .nest(base_api_route, api)
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}

#[cfg(test)]
mod tests;
