//! The `{type, record}` wire envelope.

use serde::{Deserialize, Serialize};

/// The minimal wrapper expected on every bus message.
///
/// `record` is an opaque JSON value; each handler performs its own decode
/// and validation. The envelope is transient — constructed by producers just
/// before the outbox insert and consumed by the dispatcher, never persisted
/// as its own entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Event type string, e.g. `licenseplate.scanned`. Selects the handler.
    #[serde(rename = "type")]
    pub event_type: String,

    /// The event body, interpreted only by the matching handler.
    pub record: serde_json::Value,
}

impl Envelope {
    /// Wraps a record under the given event type.
    pub fn new(event_type: impl Into<String>, record: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            record,
        }
    }

    /// Parses a raw message body.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error if the body is not a valid
    /// envelope object.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Serializes the envelope to its wire form.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error; cannot fail for envelopes built
    /// from valid JSON values.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
