//! Persistence operations for the event outbox.
//!
//! All functions take a `&Connection` so that producers can run
//! [`insert_event`] inside the same transaction as the domain mutation the
//! event describes — that single-transaction write is what makes the outbox
//! pattern crash-safe.
//!
//! Timestamps use millisecond precision so `created_at` discriminates rows
//! inserted within the same second; `id` breaks any remaining ties.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::event::OutboxEvent;

const NOW_MS: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Appends a new pending event and returns its assigned row ID.
///
/// # Errors
///
/// Returns `StoreError::Database` if the underlying store is unreachable or
/// the insert fails.
pub fn insert_event(conn: &Connection, channel: &str, payload: &str) -> Result<i64, StoreError> {
    let id = conn.query_row(
        &format!(
            "INSERT INTO outbox_events (channel, payload, attempts, created_at)
             VALUES (?1, ?2, 0, {NOW_MS})
             RETURNING id"
        ),
        params![channel, payload],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Fetches pending events in FIFO order (oldest first), capped at `limit`.
///
/// A row is pending when neither `sent_at` nor `failed_at` is set. The fetch
/// is all-or-nothing: on any failure no events are returned.
///
/// # Errors
///
/// Returns `StoreError::Database` on connectivity or query failure.
pub fn fetch_pending(conn: &Connection, limit: u32) -> Result<Vec<OutboxEvent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, channel, payload, attempts, last_error, created_at, sent_at, failed_at
         FROM outbox_events
         WHERE sent_at IS NULL AND failed_at IS NULL
         ORDER BY created_at ASC, id ASC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map([limit], row_to_event)?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

/// Marks the event as sent by setting `sent_at` to the current time.
///
/// Calling this twice is a no-op: the guarded UPDATE touches only rows where
/// `sent_at` is still null, so the first timestamp is never overwritten.
///
/// # Errors
///
/// Returns `StoreError::Database` on update failure.
pub fn mark_sent(conn: &Connection, id: i64) -> Result<(), StoreError> {
    conn.execute(
        &format!("UPDATE outbox_events SET sent_at = {NOW_MS} WHERE id = ?1 AND sent_at IS NULL"),
        [id],
    )?;
    Ok(())
}

/// Records a failed delivery attempt: increments `attempts` and overwrites
/// `last_error`. The event stays pending.
///
/// # Errors
///
/// Returns `StoreError::Database` on update failure.
pub fn record_failure(conn: &Connection, id: i64, error: &str) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE outbox_events SET attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
        params![id, error],
    )?;
    Ok(())
}

/// Parks the event as a dead letter: sets `failed_at`, increments `attempts`
/// and records the final error. Terminal — the publisher never picks the row
/// up again.
///
/// # Errors
///
/// Returns `StoreError::Database` on update failure.
pub fn mark_failed(conn: &Connection, id: i64, error: &str) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "UPDATE outbox_events
             SET failed_at = {NOW_MS}, attempts = attempts + 1, last_error = ?2
             WHERE id = ?1 AND failed_at IS NULL"
        ),
        params![id, error],
    )?;
    Ok(())
}

/// Loads a single outbox row by ID.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if no row has that ID.
pub fn get_event(conn: &Connection, id: i64) -> Result<OutboxEvent, StoreError> {
    conn.query_row(
        "SELECT id, channel, payload, attempts, last_error, created_at, sent_at, failed_at
         FROM outbox_events WHERE id = ?1",
        [id],
        row_to_event,
    )
    .optional()?
    .ok_or(StoreError::NotFound(id))
}

/// Counts rows still awaiting delivery.
///
/// # Errors
///
/// Returns `StoreError::Database` on query failure.
pub fn count_pending(conn: &Connection) -> Result<i64, StoreError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM outbox_events WHERE sent_at IS NULL AND failed_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<OutboxEvent, rusqlite::Error> {
    Ok(OutboxEvent {
        id: row.get(0)?,
        channel: row.get(1)?,
        payload: row.get(2)?,
        attempts: row.get(3)?,
        last_error: row.get(4)?,
        created_at: row.get(5)?,
        sent_at: row.get(6)?,
        failed_at: row.get(7)?,
    })
}
