//! Durable event outbox for the Plategate plugin.
//!
//! Implements the transactional outbox pattern: producers insert an event
//! row in the same transaction as the domain mutation it describes, and the
//! background [`OutboxPublisher`] drains pending rows onto the event bus.
//! Delivery is at-least-once — a row is marked sent only after both the
//! publish and the store update succeed, so a crash or store failure between
//! the two results in a duplicate delivery, never a lost event.
//!
//! # Event lifecycle
//!
//! ```text
//! Pending ──publish ok, mark ok──▶ Sent      (terminal)
//! Pending ──publish err──────────▶ Pending   (attempts + 1)
//! Pending ──attempts exhausted───▶ Failed    (terminal dead-letter)
//! ```
//!
//! `Sent` and `Failed` are one-way transitions; a row reaches each at most
//! once. A pending row is eligible for (re-)delivery on every tick until it
//! leaves the pending state.

mod error;
mod event;
mod publisher;
mod store;

pub use error::StoreError;
pub use event::{OutboxEvent, OutboxStatus};
pub use publisher::{DrainStats, OutboxPublisher, PublisherConfig};
pub use store::{
    count_pending, fetch_pending, get_event, insert_event, mark_failed, mark_sent, record_failure,
};
