//! Persistence sinks for Seedforge.
//!
//! The Postgres persister writes accepted rows in bounded batches inside a
//! per-table transaction with conflict-tolerant inserts; the seed-file sink
//! serves dry runs by capturing the same rows into a JSON document.

pub mod error;
pub mod postgres;
pub mod seedfile;

pub use error::PersistError;
pub use postgres::{DEFAULT_BATCH_SIZE, PersistReport, PostgresPersister, PostgresSink};
pub use seedfile::SeedFileSink;
