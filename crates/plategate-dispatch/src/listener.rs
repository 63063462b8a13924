//! The inbound bus listener.

use std::sync::Arc;

use plategate_bus::EventBus;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;

/// Spawns the receive loop for one bus channel.
///
/// The task holds exactly one subscription for the process lifetime and
/// forwards every message to the dispatcher without interpreting it. The
/// dispatcher spawns its own task per message, so the only thing that can
/// slow this loop down is dispatch admission (all concurrency permits
/// taken) — deliberate backpressure rather than unbounded spawning.
///
/// A lagged receiver (the bus buffer overran while this loop was busy) is
/// logged with the number of messages skipped and the loop continues; those
/// messages are gone, which the durable outbox upstream compensates for.
pub fn spawn_listener(
    bus: Arc<dyn EventBus>,
    channel: String,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe(&channel);
    tracing::info!(channel = %channel, "subscribed to bus channel");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(message) => {
                        dispatcher.dispatch(&message.channel, &message.payload).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            channel = %channel,
                            skipped,
                            "listener lagged behind the bus, messages dropped"
                        );
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!(channel = %channel, "bus channel closed, listener exiting");
                        return;
                    }
                },
                _ = shutdown.changed() => {
                    tracing::info!(channel = %channel, "listener stopping");
                    return;
                }
            }
        }
    })
}
