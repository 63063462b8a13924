//! Fire-and-forget publish/subscribe event bus.
//!
//! The bus deliberately offers a weak guarantee: a published message reaches
//! only the subscribers connected at that moment. There is no persistence,
//! no replay, and no acknowledgment protocol. Durability is the outbox's
//! job — the bus alone cannot survive a listener restart without losing
//! events, which is precisely why the outbox publisher exists upstream of it.
//!
//! The default transport is [`BroadcastBus`], a per-channel
//! `tokio::sync::broadcast` fan-out. Components take the bus as an explicit
//! `Arc<dyn EventBus>` dependency; there is no process-global client.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::broadcast;

/// A single message in flight on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// The channel the message was published on.
    pub channel: String,
    /// The raw payload string (opaque to the bus).
    pub payload: String,
}

/// Errors that can occur when publishing to the bus.
///
/// [`BroadcastBus`] itself never fails to accept a send; this type exists so
/// that other transports (and test doubles simulating an unreachable broker)
/// can report transport-level failures through the same seam.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport refused or could not accept the send.
    #[error("bus transport unavailable: {0}")]
    Unavailable(String),
}

/// Publish/subscribe abstraction over the messaging transport.
///
/// `publish` is fire-and-forget: success means the send was accepted by the
/// transport, not that any subscriber received it. `subscribe` returns a
/// receiver that observes only messages published while it is connected.
pub trait EventBus: Send + Sync {
    /// Publishes a payload to the named channel.
    ///
    /// Returns the number of subscribers the message was handed to. Zero is
    /// a success: with nobody connected the message is silently dropped, in
    /// keeping with the no-history contract.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Unavailable` if the transport cannot accept the
    /// send.
    fn publish(&self, channel: &str, payload: &str) -> Result<usize, BusError>;

    /// Opens a subscription to the named channel.
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<BusMessage>;
}

/// In-process bus backed by per-channel `tokio::sync::broadcast` topics.
///
/// Topics are created lazily on first publish or subscribe and kept for the
/// process lifetime. Each topic buffers up to `capacity` messages per
/// subscriber; a subscriber that falls further behind observes a lag error
/// on its receiver and skips ahead.
pub struct BroadcastBus {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl BroadcastBus {
    /// Creates a bus whose per-channel buffer holds `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the sender for `channel`, creating the topic if needed.
    fn topic(&self, channel: &str) -> broadcast::Sender<BusMessage> {
        let mut topics = self.topics.lock().expect("bus topic map poisoned");
        topics
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, channel: &str, payload: &str) -> Result<usize, BusError> {
        let message = BusMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        match self.topic(channel).send(message) {
            Ok(receivers) => Ok(receivers),
            // No receivers connected: the message is dropped, which is the
            // documented fire-and-forget behavior, not a failure.
            Err(_) => {
                tracing::debug!(channel, "published with no subscribers, message dropped");
                Ok(0)
            }
        }
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<BusMessage> {
        self.topic(channel).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = BroadcastBus::new(8);
        let delivered = bus.publish("events", "hello").expect("publish should succeed");
        assert_eq!(delivered, 0, "nobody connected, message dropped");
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let bus = BroadcastBus::new(8);
        let mut rx = bus.subscribe("events");

        let delivered = bus.publish("events", "scan-1").expect("publish should succeed");
        assert_eq!(delivered, 1);

        let msg = rx.recv().await.expect("should receive message");
        assert_eq!(msg.channel, "events");
        assert_eq!(msg.payload, "scan-1");
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let bus = BroadcastBus::new(8);
        let mut events_rx = bus.subscribe("events");
        let mut other_rx = bus.subscribe("other");

        bus.publish("events", "only-for-events").expect("publish should succeed");

        let msg = events_rx.recv().await.expect("events subscriber should receive");
        assert_eq!(msg.payload, "only-for-events");

        assert!(
            matches!(other_rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)),
            "other channel should see nothing"
        );
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_messages() {
        let bus = BroadcastBus::new(8);
        bus.publish("events", "before").expect("publish should succeed");

        let mut rx = bus.subscribe("events");
        bus.publish("events", "after").expect("publish should succeed");

        let msg = rx.recv().await.expect("should receive the later message");
        assert_eq!(msg.payload, "after", "no history: earlier message is gone");
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_message() {
        let bus = BroadcastBus::new(8);
        let mut a = bus.subscribe("events");
        let mut b = bus.subscribe("events");

        let delivered = bus.publish("events", "fan-out").expect("publish should succeed");
        assert_eq!(delivered, 2);

        assert_eq!(a.recv().await.unwrap().payload, "fan-out");
        assert_eq!(b.recv().await.unwrap().payload, "fan-out");
    }
}
