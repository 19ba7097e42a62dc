//! Storage backends for the linkvault registry.
//!
//! Three interchangeable implementations of [`Repository`]:
//!
//! - [`VolatileRepository`]: two in-memory indexes, nothing persisted.
//! - [`JournaledRepository`]: the same indexes plus an append-only JSON-lines
//!   journal that is replayed on startup.
//! - [`PgRepository`]: delegates indexing and durability to PostgreSQL.
//!
//! [`BulkDeleter`] fans a batch of soft deletes out over any of them.

pub mod bulk_delete;
mod index;
pub mod journaled;
pub mod postgres;
pub mod volatile;

pub use bulk_delete::{BulkDeleteReport, BulkDeleter, DeleteOutcome, DEFAULT_DELETE_CONCURRENCY};
pub use journaled::{JournaledRepository, RecoveryReport};
pub use linkvault_core::{Repository, Result, StorageError};
pub use postgres::PgRepository;
pub use volatile::VolatileRepository;
