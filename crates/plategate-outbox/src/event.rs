//! The outbox event model.

use serde::Serialize;

/// A durable record of one event awaiting delivery.
///
/// Timestamps are ISO 8601 strings as stored by SQLite; `created_at` carries
/// millisecond precision and defines FIFO order for the publisher.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutboxEvent {
    /// Monotonically assigned row ID.
    pub id: i64,
    /// Destination channel name on the bus.
    pub channel: String,
    /// Opaque serialized event body; not interpreted by the outbox layer.
    pub payload: String,
    /// Count of failed delivery tries. Starts at 0, only increases.
    pub attempts: u32,
    /// Most recent failure description, overwritten on each failed attempt.
    pub last_error: Option<String>,
    /// Insertion timestamp.
    pub created_at: String,
    /// Set once, after a successful publish and a successful store update.
    pub sent_at: Option<String>,
    /// Set once, when the attempt ceiling is reached (dead-letter).
    pub failed_at: Option<String>,
}

/// Delivery state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Awaiting delivery; eligible for (re-)publish regardless of attempts.
    Pending,
    /// Delivered and recorded. Terminal.
    Sent,
    /// Attempt ceiling reached; parked as a dead letter. Terminal.
    Failed,
}

impl OutboxEvent {
    /// Derives the delivery state from the timestamp columns.
    pub fn status(&self) -> OutboxStatus {
        if self.sent_at.is_some() {
            OutboxStatus::Sent
        } else if self.failed_at.is_some() {
            OutboxStatus::Failed
        } else {
            OutboxStatus::Pending
        }
    }
}
