//! Envelope parsing and handler routing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::envelope::Envelope;
use crate::handler::EventHandler;

/// What to do with a message whose handler failed.
///
/// The bus gives no redelivery, so under [`Discard`](FailurePolicy::Discard)
/// a handler failure permanently loses that delivery attempt. Under
/// [`Requeue`](FailurePolicy::Requeue) the raw envelope is fed back through
/// the configured [`RequeueSink`] (normally the outbox) for a fresh delivery
/// attempt on a later publisher tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and drop the message.
    #[default]
    Discard,
    /// Log the failure and re-insert the message for redelivery.
    Requeue,
}

/// Destination for messages re-queued after a handler failure.
pub trait RequeueSink: Send + Sync {
    /// Re-inserts the raw payload for a later delivery attempt on `channel`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the dispatcher; the message is then lost, the
    /// same as under [`FailurePolicy::Discard`].
    fn requeue(
        &self,
        channel: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Routes parsed envelopes to registered handlers.
///
/// Handlers run on detached blocking tasks holding a semaphore permit;
/// [`dispatch`](Dispatcher::dispatch) waits for a permit before spawning, so
/// at most `max_concurrency` handlers run at once and a burst of messages
/// backpressures the caller instead of exhausting the process.
pub struct Dispatcher {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
    permits: Arc<Semaphore>,
    policy: FailurePolicy,
    requeue_sink: Option<Arc<dyn RequeueSink>>,
}

impl Dispatcher {
    /// Creates a dispatcher with no handlers and the default
    /// [`FailurePolicy::Discard`].
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            handlers: HashMap::new(),
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            policy: FailurePolicy::Discard,
            requeue_sink: None,
        }
    }

    /// Registers a handler under its event type, replacing any previous
    /// registration for that type.
    pub fn register(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(handler.event_type(), handler);
        self
    }

    /// Sets the handler-failure policy. `Requeue` without a sink falls back
    /// to `Discard` at dispatch time (logged).
    pub fn with_failure_policy(
        mut self,
        policy: FailurePolicy,
        sink: Option<Arc<dyn RequeueSink>>,
    ) -> Self {
        self.policy = policy;
        self.requeue_sink = sink;
        self
    }

    /// Parses a raw message and routes it to the matching handler.
    ///
    /// Parse failures and unknown event types are logged and dropped
    /// permanently — the bus has no redelivery at this layer. The handler
    /// itself runs on a detached task; this method returns as soon as the
    /// task is spawned, which happens once a concurrency permit is free.
    pub async fn dispatch(self: &Arc<Self>, channel: &str, raw: &str) {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(channel, "invalid event envelope, dropping: {}", e);
                return;
            }
        };

        let Some(handler) = self.handlers.get(envelope.event_type.as_str()).cloned() else {
            tracing::warn!(
                channel,
                event_type = %envelope.event_type,
                "no handler for event type, dropping"
            );
            return;
        };

        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            // The semaphore is never closed; this arm exists to avoid a
            // panic path if that ever changes.
            return;
        };

        let dispatcher = Arc::clone(self);
        let channel = channel.to_string();
        let raw = raw.to_string();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let event_type = envelope.event_type.as_str();
            match handler.handle(&envelope.record) {
                Ok(()) => {
                    tracing::debug!(channel = %channel, event_type, "event handled");
                }
                Err(e) => {
                    tracing::error!(channel = %channel, event_type, "handler error: {}", e);
                    dispatcher.handle_failure(&channel, event_type, &raw);
                }
            }
        });
    }

    /// Applies the failure policy to a message whose handler failed.
    fn handle_failure(&self, channel: &str, event_type: &str, raw: &str) {
        match (self.policy, self.requeue_sink.as_ref()) {
            (FailurePolicy::Discard, _) => {}
            (FailurePolicy::Requeue, Some(sink)) => match sink.requeue(channel, raw) {
                Ok(()) => {
                    tracing::info!(channel, event_type, "failed event re-queued for redelivery");
                }
                Err(e) => {
                    tracing::error!(
                        channel,
                        event_type,
                        "re-queue failed, message lost: {}",
                        e
                    );
                }
            },
            (FailurePolicy::Requeue, None) => {
                tracing::error!(
                    channel,
                    event_type,
                    "requeue policy configured without a sink, message lost"
                );
            }
        }
    }
}
