//! # Watch Store
//!
//! Persistence for the appointment watcher: a small key-value state table and an
//! append-only check log, behind the [`StateStore`] trait so the backend can be
//! swapped between an embedded SQLite file and a networked PostgreSQL database.

/// Store contract, check log entries and persisted state keys.
pub mod store;
pub use store::*;

/// Backend selection and connection helpers.
pub mod database;
pub use database::*;

/// SQLite backend.
pub mod sqlite;
pub use sqlite::SqliteStateStore;

/// PostgreSQL backend.
pub mod postgres;
pub use postgres::PostgresStateStore;

/// In-memory backend used by tests and dry runs.
pub mod memory;
pub use memory::MemoryStateStore;
