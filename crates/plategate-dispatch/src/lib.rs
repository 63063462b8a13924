//! Inbound event routing for the Plategate plugin.
//!
//! The [`Listener`](spawn_listener) holds one bus subscription per channel
//! for the process lifetime and hands every raw message to the
//! [`Dispatcher`], which parses the `{type, record}` envelope and routes it
//! to the [`EventHandler`] registered for that type. Handlers run on their
//! own tasks so a slow handler never stalls ingestion; the number of
//! concurrently running handlers is bounded by a semaphore, so a message
//! burst backpressures the receive loop instead of spawning without limit.
//!
//! The bus offers no redelivery, so anything dropped at this layer —
//! malformed envelopes, unknown event types — is dropped permanently and
//! only logged. What happens on a handler failure is a policy choice: see
//! [`FailurePolicy`].

mod dispatcher;
mod envelope;
mod handler;
mod listener;

pub use dispatcher::{Dispatcher, FailurePolicy, RequeueSink};
pub use envelope::Envelope;
pub use handler::{EventHandler, HandlerError};
pub use listener::spawn_listener;
