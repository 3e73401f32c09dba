//! Storage adapters for the receivables ledger.
//!
//! Both adapters implement every port in [`domain::ports`]:
//! - [`InMemoryStore`] for tests and local runs
//! - [`PostgresStore`] for production, built on `sqlx`

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
