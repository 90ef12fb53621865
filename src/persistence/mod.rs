//! Persistence layer: monitoring configs, product prices, job run log and
//! the append-only price ledger.
//!
//! The store traits live in [`crate::ports`]. [`postgres::PostgresStore`]
//! uses `sqlx::PgPool` for async PostgreSQL access; [`memory::InMemoryStore`]
//! backs the same traits with process-local collections.

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
