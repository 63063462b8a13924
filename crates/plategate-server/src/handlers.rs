//! Typed event handlers registered with the dispatcher.

use plategate_db::DbPool;
use plategate_dispatch::{EventHandler, HandlerError};
use plategate_records::{normalize_plate, process_scan, ScanEvent};

/// Event type for a recorded plate scan.
pub const PLATE_SCANNED_EVENT: &str = "licenseplate.scanned";

/// Handles `licenseplate.scanned` events from the bus.
///
/// Decodes the record as a [`ScanEvent`], rejects records without a plate
/// number, and forwards to the records service. The service runs the event
/// log insert and any auto-registration in one transaction, so a failed
/// invocation leaves no partial side effects.
pub struct PlateScannedHandler {
    pool: DbPool,
}

impl PlateScannedHandler {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EventHandler for PlateScannedHandler {
    fn event_type(&self) -> &'static str {
        PLATE_SCANNED_EVENT
    }

    fn handle(&self, record: &serde_json::Value) -> Result<(), HandlerError> {
        let scan: ScanEvent = serde_json::from_value(record.clone())?;

        if normalize_plate(&scan.plate_number).is_empty() {
            return Err(HandlerError::Rejected(
                "missing plate number in record".to_string(),
            ));
        }

        let conn = self
            .pool
            .get()
            .map_err(|e| HandlerError::Downstream(e.to_string()))?;
        process_scan(&conn, &scan).map_err(|e| HandlerError::Downstream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plategate_db::{create_pool, run_migrations, DbRuntimeSettings};
    use serde_json::json;

    fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("handlers-test.db");
        let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default())
            .expect("pool creation should succeed");
        run_migrations(&pool.get().unwrap()).expect("migrations should succeed");
        (dir, pool)
    }

    #[test]
    fn scanned_record_is_processed() {
        let (_dir, pool) = test_pool();
        let handler = PlateScannedHandler::new(pool.clone());

        handler
            .handle(&json!({"plate_number": "ABC123", "event_type": "entry"}))
            .expect("handler should succeed");

        let conn = pool.get().unwrap();
        let events = plategate_records::list_parking_events(&conn, "ABC123").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "entry");
    }

    #[test]
    fn record_without_plate_number_is_rejected_with_no_side_effects() {
        let (_dir, pool) = test_pool();
        let handler = PlateScannedHandler::new(pool.clone());

        let err = handler
            .handle(&json!({"event_type": "entry", "location": "north gate"}))
            .expect_err("missing plate should be rejected");
        assert!(matches!(err, HandlerError::Rejected(_)), "got {err:?}");

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM parking_events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "no domain side effect on rejection");
    }

    #[test]
    fn unparsable_record_surfaces_decode_error() {
        let (_dir, pool) = test_pool();
        let handler = PlateScannedHandler::new(pool);

        let err = handler
            .handle(&json!({"plate_number": ["not", "a", "string"]}))
            .expect_err("non-string plate should fail decode");
        assert!(matches!(err, HandlerError::Decode(_)), "got {err:?}");
    }
}
