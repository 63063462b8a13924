//! Database layer for the Plategate plugin.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Every table in Plategate — the license-plate
//! records, the parking event log, and the event outbox — is created through
//! versioned migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: the plugin runs as a single self-contained
//!   process next to the broker; no external database server required. WAL
//!   mode allows concurrent readers with a single writer, which matches the
//!   access pattern here (HTTP handlers read, the outbox publisher writes).
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema ships with the plugin and cannot drift
//!   from the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
