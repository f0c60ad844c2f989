//! Audit trail for processed files
//!
//! One [`BatchRecord`] per input file and one [`RecordOutcome`] per input row,
//! kept in a local SQLite database. These records, not the log output, are
//! the source of truth for what happened to each row.

pub mod schema;
pub mod store;
pub mod types;

pub use store::{AuditStore, SqliteAuditStore};
pub use types::{BatchRecord, BatchStatus, NewOutcome, RecordOutcome, RowFailure};
