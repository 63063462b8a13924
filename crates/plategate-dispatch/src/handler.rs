//! The typed event handler contract.

use thiserror::Error;

/// Errors a handler can report back to the dispatcher.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The record body could not be decoded into the handler's input type.
    #[error("invalid record: {0}")]
    Decode(#[from] serde_json::Error),

    /// The record decoded but failed the handler's own validation.
    #[error("rejected record: {0}")]
    Rejected(String),

    /// A downstream service call failed while processing the record.
    #[error("handler failed: {0}")]
    Downstream(String),
}

/// Domain logic invoked for one event type.
///
/// Each handler decodes and validates the raw `record` body itself. A
/// handler either succeeds with its side effects committed, or fails with a
/// descriptive error and no partial side effects visible — atomicity within
/// the handler is the handler's own responsibility.
///
/// Handlers run on blocking tasks, so synchronous store access is fine; they
/// must enforce their own timeouts on anything slow.
pub trait EventHandler: Send + Sync {
    /// The envelope `type` string this handler is registered for.
    fn event_type(&self) -> &'static str;

    /// Processes one decoded envelope record.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError` on decode, validation, or downstream failure.
    /// The dispatcher logs the error and applies the configured
    /// [`FailurePolicy`](crate::FailurePolicy).
    fn handle(&self, record: &serde_json::Value) -> Result<(), HandlerError>;
}
