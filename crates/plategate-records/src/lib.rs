//! License-plate records and parking events for the Plategate plugin.
//!
//! Implements the record CRUD behind the HTTP API, the append-only entry and
//! exit event log, and camera scan processing. Plate numbers are stored
//! normalized (uppercase, spaces stripped) so the same vehicle always maps
//! to the same row regardless of how a camera or an operator typed it.

use chrono::DateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Visitor categories a record may carry.
const VALID_VISITOR_TYPES: &[&str] = &["guest", "visitor", "staff", "delivery", "contractor", "vip"];

/// Errors that can occur during record operations.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// A registered license plate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LicensePlateRecord {
    /// Normalized plate number (uppercase, no spaces).
    pub plate_number: String,
    pub guest_name: String,
    pub room_number: Option<String>,
    pub check_in: String,
    pub check_out: Option<String>,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
    pub notes: Option<String>,
    /// One of: guest, visitor, staff, delivery, contractor, vip.
    pub visitor_type: String,
    /// When temporary access expires (ISO 8601), for non-guests.
    pub access_expires_at: Option<String>,
    pub purpose: Option<String>,
    pub created_at: String,
}

/// Request body for registering or updating a plate.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub plate_number: String,
    pub guest_name: String,
    pub room_number: Option<String>,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
    pub notes: Option<String>,
    pub visitor_type: Option<String>,
    /// ISO 8601 timestamp for access expiration.
    pub access_expires_at: Option<String>,
    pub purpose: Option<String>,
}

/// One entry or exit detection for a vehicle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParkingEvent {
    pub id: i64,
    pub plate_number: String,
    /// Either `entry` or `exit`.
    pub event_type: String,
    pub event_time: String,
    pub location: Option<String>,
    pub camera_id: Option<String>,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
    pub created_at: String,
}

/// Payload delivered by a gate camera, both over the webhook endpoint and
/// inside `licenseplate.scanned` envelopes on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScanEvent {
    /// Raw camera event type, e.g. `entry`, `exit`, `scan`, `in`, `out`.
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub plate_number: String,
    /// When the plate was scanned (ISO 8601).
    pub timestamp: Option<String>,
    /// Camera/gate location.
    pub location: Option<String>,
    /// Recognition confidence, 0 to 1.
    pub confidence: Option<f64>,
    pub image_url: Option<String>,
    pub camera_id: Option<String>,
    pub vehicle_type: Option<String>,
    pub direction: Option<String>,
    pub lane_number: Option<i64>,
}

/// Search criteria for listing records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    /// Substring match against plate number or guest name.
    pub search: Option<String>,
    /// Exact visitor type filter.
    pub visitor_type: Option<String>,
    /// Records created at or after this timestamp.
    pub date_from: Option<String>,
    /// Records created at or before this timestamp.
    pub date_to: Option<String>,
}

/// Normalizes a plate number: uppercase, spaces stripped.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Registers a plate, or updates the existing record for the same plate.
///
/// # Errors
///
/// Returns `RecordError::InvalidInput` for an empty plate number, an unknown
/// visitor type, or an unparsable `access_expires_at`; `RecordError::Database`
/// on store failure.
pub fn upsert_record(conn: &Connection, req: &ScanRequest) -> Result<LicensePlateRecord, RecordError> {
    let plate_number = normalize_plate(&req.plate_number);
    if plate_number.is_empty() {
        return Err(RecordError::InvalidInput("plate number is required".to_string()));
    }
    if req.guest_name.trim().is_empty() {
        return Err(RecordError::InvalidInput("guest name is required".to_string()));
    }

    let visitor_type = req.visitor_type.as_deref().unwrap_or("guest");
    if !VALID_VISITOR_TYPES.contains(&visitor_type) {
        return Err(RecordError::InvalidInput(format!(
            "invalid visitor type: {visitor_type}"
        )));
    }

    if let Some(expires) = req.access_expires_at.as_deref() {
        DateTime::parse_from_rfc3339(expires).map_err(|_| {
            RecordError::InvalidInput(
                "invalid access_expires_at format, use ISO 8601".to_string(),
            )
        })?;
    }

    conn.execute(
        "INSERT INTO license_plates (
            plate_number, guest_name, room_number, check_in, vehicle_make,
            vehicle_model, notes, visitor_type, access_expires_at, purpose
        ) VALUES (?1, ?2, ?3, datetime('now'), ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT (plate_number) DO UPDATE SET
            guest_name = ?2, room_number = ?3, check_in = datetime('now'),
            vehicle_make = ?4, vehicle_model = ?5, notes = ?6,
            visitor_type = ?7, access_expires_at = ?8, purpose = ?9,
            updated_at = datetime('now')",
        params![
            plate_number,
            req.guest_name,
            req.room_number,
            req.vehicle_make,
            req.vehicle_model,
            req.notes,
            visitor_type,
            req.access_expires_at,
            req.purpose,
        ],
    )?;

    get_record(conn, &plate_number)
}

/// Retrieves a record by plate number (normalized before lookup).
///
/// # Errors
///
/// Returns `RecordError::NotFound` if the plate is not registered.
pub fn get_record(conn: &Connection, plate_number: &str) -> Result<LicensePlateRecord, RecordError> {
    let plate = normalize_plate(plate_number);
    conn.query_row(
        "SELECT plate_number, guest_name, room_number, check_in, check_out,
                vehicle_make, vehicle_model, notes, visitor_type,
                access_expires_at, purpose, created_at
         FROM license_plates WHERE plate_number = ?1",
        [&plate],
        row_to_record,
    )
    .optional()?
    .ok_or(RecordError::NotFound(plate))
}

/// Lists records matching the given filters, newest first.
///
/// # Errors
///
/// Returns `RecordError::Database` on query failure.
pub fn list_records(
    conn: &Connection,
    filters: &SearchFilters,
) -> Result<Vec<LicensePlateRecord>, RecordError> {
    // Collect WHERE clauses and bind parameters separately so nothing is
    // interpolated.
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref search) = filters.search {
        // Plates are matched normalized, names as typed (case-insensitive).
        clauses.push(format!(
            "(plate_number LIKE ?{} OR LOWER(guest_name) LIKE LOWER(?{}))",
            idx,
            idx + 1
        ));
        param_values.push(Box::new(format!("%{}%", normalize_plate(search))));
        param_values.push(Box::new(format!("%{}%", search.trim())));
        idx += 2;
    }

    if let Some(ref visitor_type) = filters.visitor_type {
        clauses.push(format!("visitor_type = ?{idx}"));
        param_values.push(Box::new(visitor_type.clone()));
        idx += 1;
    }

    if let Some(ref from) = filters.date_from {
        clauses.push(format!("created_at >= ?{idx}"));
        param_values.push(Box::new(from.clone()));
        idx += 1;
    }

    if let Some(ref to) = filters.date_to {
        clauses.push(format!("created_at <= ?{idx}"));
        param_values.push(Box::new(to.clone()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT plate_number, guest_name, room_number, check_in, check_out,
                vehicle_make, vehicle_model, notes, visitor_type,
                access_expires_at, purpose, created_at
         FROM license_plates {where_clause}
         ORDER BY created_at DESC"
    );

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), row_to_record)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Deletes a record by plate number.
///
/// # Errors
///
/// Returns `RecordError::NotFound` if the plate is not registered.
pub fn delete_record(conn: &Connection, plate_number: &str) -> Result<(), RecordError> {
    let plate = normalize_plate(plate_number);
    let deleted = conn.execute("DELETE FROM license_plates WHERE plate_number = ?1", [&plate])?;
    if deleted == 0 {
        return Err(RecordError::NotFound(plate));
    }
    Ok(())
}

/// Appends one entry/exit event to the parking log.
///
/// # Errors
///
/// Returns `RecordError::Database` on insert failure.
pub fn log_parking_event(
    conn: &Connection,
    plate_number: &str,
    event_type: &str,
    location: Option<&str>,
    camera_id: Option<&str>,
    confidence: Option<f64>,
    notes: Option<&str>,
) -> Result<i64, RecordError> {
    let id = conn.query_row(
        "INSERT INTO parking_events (plate_number, event_type, location, camera_id, confidence, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING id",
        params![plate_number, event_type, location, camera_id, confidence, notes],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Retrieves the event history for a plate, most recent first.
///
/// # Errors
///
/// Returns `RecordError::Database` on query failure.
pub fn list_parking_events(
    conn: &Connection,
    plate_number: &str,
) -> Result<Vec<ParkingEvent>, RecordError> {
    let plate = normalize_plate(plate_number);
    let mut stmt = conn.prepare(
        "SELECT id, plate_number, event_type, event_time, location, camera_id,
                confidence, notes, created_at
         FROM parking_events
         WHERE plate_number = ?1
         ORDER BY event_time DESC, id DESC",
    )?;

    let rows = stmt.query_map([&plate], |row| {
        Ok(ParkingEvent {
            id: row.get(0)?,
            plate_number: row.get(1)?,
            event_type: row.get(2)?,
            event_time: row.get(3)?,
            location: row.get(4)?,
            camera_id: row.get(5)?,
            confidence: row.get(6)?,
            notes: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

/// Processes one camera scan: logs the entry/exit event and auto-registers
/// vehicles that have never been seen before.
///
/// Camera event types map onto the two-valued log: `exit`/`out` become
/// `exit`, everything else (including unknown strings, which are logged)
/// becomes `entry`.
///
/// # Errors
///
/// Returns `RecordError::InvalidInput` when the scan carries no plate
/// number; `RecordError::Database` on store failure. No partial state is
/// left behind on failure: the event log insert and the auto-registration
/// run inside one transaction.
pub fn process_scan(conn: &Connection, scan: &ScanEvent) -> Result<(), RecordError> {
    let plate_number = normalize_plate(&scan.plate_number);
    if plate_number.is_empty() {
        return Err(RecordError::InvalidInput("plate number is required".to_string()));
    }

    let event_type = match scan.event_type.as_str() {
        "exit" | "out" => "exit",
        "entry" | "scan" | "in" => "entry",
        other => {
            tracing::warn!(
                plate = %plate_number,
                event_type = other,
                "unknown camera event type, treating as entry"
            );
            "entry"
        }
    };

    let notes = scan
        .confidence
        .map(|c| format!("Auto-detected (confidence: {:.2}%)", c * 100.0));

    let tx = conn.unchecked_transaction()?;

    log_parking_event(
        &tx,
        &plate_number,
        event_type,
        scan.location.as_deref(),
        scan.camera_id.as_deref(),
        scan.confidence,
        notes.as_deref(),
    )?;

    // First sighting of an unregistered vehicle: create a minimal visitor
    // record so it shows up in the UI for follow-up.
    let known: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM license_plates WHERE plate_number = ?1)",
        [&plate_number],
        |row| row.get(0),
    )?;
    if !known {
        let first_seen = format!(
            "First detected at {} by camera {}",
            scan.location.as_deref().unwrap_or("unknown location"),
            scan.camera_id.as_deref().unwrap_or("unknown"),
        );
        tx.execute(
            "INSERT INTO license_plates (plate_number, guest_name, check_in, notes, visitor_type)
             VALUES (?1, 'Unknown Guest (Auto-detected)', COALESCE(?2, datetime('now')), ?3, 'visitor')",
            params![plate_number, scan.timestamp, first_seen],
        )?;
        tracing::info!(plate = %plate_number, "auto-registered unknown vehicle");
    }

    tx.commit()?;
    tracing::info!(plate = %plate_number, event_type, "logged parking event");
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> Result<LicensePlateRecord, rusqlite::Error> {
    Ok(LicensePlateRecord {
        plate_number: row.get(0)?,
        guest_name: row.get(1)?,
        room_number: row.get(2)?,
        check_in: row.get(3)?,
        check_out: row.get(4)?,
        vehicle_make: row.get(5)?,
        vehicle_model: row.get(6)?,
        notes: row.get(7)?,
        visitor_type: row.get(8)?,
        access_expires_at: row.get(9)?,
        purpose: row.get(10)?,
        created_at: row.get(11)?,
    })
}
