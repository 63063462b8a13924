//! Timer-driven background publisher that drains the outbox onto the bus.

use std::sync::Arc;
use std::time::Duration;

use plategate_bus::EventBus;
use plategate_db::DbPool;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::StoreError;
use crate::store::{fetch_pending, mark_failed, mark_sent, record_failure};

/// Tunables for the outbox publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Time between drain ticks.
    pub poll_interval: Duration,

    /// Maximum number of pending events fetched per tick.
    pub batch_size: u32,

    /// Attempt ceiling: once a pending event has failed to publish this many
    /// times it is parked as a dead letter instead of being retried forever.
    pub max_attempts: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            batch_size: 50,
            max_attempts: 10,
        }
    }
}

/// Counters for one drain tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    /// Events published and marked sent.
    pub published: usize,
    /// Events that failed and remain pending for a later tick.
    pub retried: usize,
    /// Events parked as dead letters this tick.
    pub dead_lettered: usize,
}

impl DrainStats {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Drains pending outbox rows onto the event bus on a fixed interval.
///
/// Events within one batch are processed strictly sequentially in fetch
/// order; one failing event never blocks the rest of the batch. The
/// publisher assumes it is the only instance draining this outbox — running
/// two concurrently would double-deliver pending rows (beyond the
/// at-least-once duplicates already allowed by the contract).
pub struct OutboxPublisher {
    pool: DbPool,
    bus: Arc<dyn EventBus>,
    config: PublisherConfig,
}

impl OutboxPublisher {
    /// Creates a publisher over the given pool and bus.
    pub fn new(pool: DbPool, bus: Arc<dyn EventBus>, config: PublisherConfig) -> Self {
        Self { pool, bus, config }
    }

    /// Runs the drain loop until the shutdown signal fires.
    ///
    /// A tick already in progress when shutdown arrives completes before the
    /// loop returns; the next tick is never started.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval's first tick completes immediately; the first drain
        // should happen one full interval after startup.
        ticker.tick().await;

        tracing::info!(
            interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "outbox publisher started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let publisher = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || publisher.drain_once()).await {
                        Ok(Ok(stats)) => {
                            if !stats.is_empty() {
                                tracing::info!(
                                    published = stats.published,
                                    retried = stats.retried,
                                    dead_lettered = stats.dead_lettered,
                                    "outbox drain tick complete"
                                );
                            }
                        }
                        // Store failure during fetch: the whole tick is
                        // skipped with nothing attempted; retried next tick.
                        Ok(Err(e)) => {
                            tracing::error!("outbox fetch failed, skipping tick: {}", e);
                        }
                        Err(e) => {
                            tracing::error!("outbox drain join error: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("outbox publisher stopping");
                    return;
                }
            }
        }
    }

    /// Performs one drain tick synchronously.
    ///
    /// Fetches up to `batch_size` pending events and, for each in fetch
    /// order:
    ///
    /// - publish failure: the attempt is recorded and the event stays
    ///   pending, unless this failure reaches the attempt ceiling, in which
    ///   case the event is parked as a dead letter;
    /// - publish success followed by a mark-sent failure: the attempt is
    ///   recorded and the event stays pending, so it will be republished on
    ///   a later tick even though the bus already delivered it once. This is
    ///   the explicit at-least-once guarantee — consumers must tolerate
    ///   duplicates. The attempt ceiling applies on this path as well:
    ///   once reached, the delivered-but-unrecorded row is parked as a dead
    ///   letter rather than redelivered forever.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` only when the fetch itself fails; per-event
    /// store failures are logged and never abort the batch.
    pub fn drain_once(&self) -> Result<DrainStats, StoreError> {
        let conn = self.pool.get()?;
        let events = fetch_pending(&conn, self.config.batch_size)?;

        let mut stats = DrainStats::default();

        for event in events {
            match self.bus.publish(&event.channel, &event.payload) {
                Err(err) => {
                    let message = err.to_string();
                    if event.attempts + 1 >= self.config.max_attempts {
                        tracing::warn!(
                            id = event.id,
                            channel = %event.channel,
                            attempts = event.attempts + 1,
                            "attempt ceiling reached, parking event as dead letter: {}",
                            message
                        );
                        if let Err(e) = mark_failed(&conn, event.id, &message) {
                            tracing::warn!(id = event.id, "failed to park dead letter: {}", e);
                        }
                        stats.dead_lettered += 1;
                    } else {
                        tracing::warn!(
                            id = event.id,
                            channel = %event.channel,
                            "publish failed: {}",
                            message
                        );
                        if let Err(e) = record_failure(&conn, event.id, &message) {
                            tracing::warn!(id = event.id, "failed to record attempt: {}", e);
                        }
                        stats.retried += 1;
                    }
                }
                Ok(_) => match mark_sent(&conn, event.id) {
                    Ok(()) => {
                        tracing::debug!(
                            id = event.id,
                            channel = %event.channel,
                            "published and marked sent"
                        );
                        stats.published += 1;
                    }
                    Err(err) => {
                        // Already delivered once; staying pending trades a
                        // duplicate delivery for never losing the event. The
                        // attempt ceiling applies here too, so a row that
                        // keeps delivering but never records eventually
                        // parks instead of duplicating forever.
                        let message = format!("mark sent failed: {err}");
                        if event.attempts + 1 >= self.config.max_attempts {
                            tracing::warn!(
                                id = event.id,
                                channel = %event.channel,
                                attempts = event.attempts + 1,
                                "attempt ceiling reached on delivered event, parking as dead letter: {}",
                                message
                            );
                            if let Err(e) = mark_failed(&conn, event.id, &message) {
                                tracing::warn!(id = event.id, "failed to park dead letter: {}", e);
                            }
                            stats.dead_lettered += 1;
                        } else {
                            tracing::warn!(id = event.id, "{}", message);
                            if let Err(e) = record_failure(&conn, event.id, &message) {
                                tracing::warn!(id = event.id, "failed to record attempt: {}", e);
                            }
                            stats.retried += 1;
                        }
                    }
                },
            }
        }

        Ok(stats)
    }
}
