//! Error types for the ingestion pipeline
//!
//! Only run-level and file-level failures live here. Row-level failures
//! ([`crate::lookup::LookupError`], [`crate::notify::NotifyError`],
//! [`crate::parser::MalformedRow`]) never leave the row that produced them;
//! they are folded into a [`crate::audit::RowFailure`] and recorded.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system operation failed outside of a single input file
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// The input file could not be opened or decoded; fatal to that file only
    #[error("File '{file}' is unreadable: {reason}")]
    FileUnreadable { file: String, reason: String },

    /// The processed file could not be moved; it stays in the watch directory
    #[error("Failed to archive '{}': {reason}", source_path.display())]
    Archive { source_path: PathBuf, reason: String },

    /// Audit database operation failed (rusqlite)
    #[error("Audit database error: {0}")]
    AuditDb(#[from] rusqlite::Error),

    /// Audit bookkeeping violated an invariant
    #[error("Audit trail error: {0}")]
    Audit(String),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn audit(msg: impl Into<String>) -> Self {
        Self::Audit(msg.into())
    }

    pub fn file_unreadable(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::FileUnreadable {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    pub fn archive(source_path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Archive {
            source_path: source_path.into(),
            reason: reason.to_string(),
        }
    }

    /// Persistence failures end the whole run: without durable bookkeeping
    /// there is no safe way to continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuditDb(_) | Self::Audit(_))
    }
}

impl From<zipflow_common::CommonError> for IngestError {
    fn from(err: zipflow_common::CommonError) -> Self {
        Self::Config(err.to_string())
    }
}
