//! Audit record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use zipflow_common::{EmailAddress, Location, PostalCode};

use crate::error::IngestError;
use crate::lookup::LookupError;
use crate::notify::NotifyError;
use crate::parser::MalformedRow;

/// Batch lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Rows are still being recorded
    Processing,
    /// Every row succeeded
    Completed,
    /// At least one row failed
    PartialFailure,
    /// The file itself could not be read
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::PartialFailure => "partial_failure",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchStatus::Processing)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "partial_failure" => Ok(BatchStatus::PartialFailure),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(IngestError::audit(format!("unknown batch status '{}'", other))),
        }
    }
}

/// One processed input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: i64,
    pub file_name: String,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Archived file name, once the move succeeded
    pub archived_as: Option<String>,

    /// Set only for `Failed` batches
    pub failure_reason: Option<String>,
}

/// Durable outcome of one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub id: i64,
    pub batch_id: i64,
    pub row_index: u64,
    pub postal_code: String,
    pub email: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub success: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Why a row failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowFailure {
    #[error(transparent)]
    Malformed(#[from] MalformedRow),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Delivery(#[from] NotifyError),
}

impl RowFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            RowFailure::Malformed(_) => "malformed_row",
            RowFailure::Lookup(e) => e.kind(),
            RowFailure::Delivery(e) => e.kind(),
        }
    }
}

/// An outcome about to be recorded.
///
/// Built only through [`NewOutcome::success`] and [`NewOutcome::failure`], so
/// a success always carries a location and a failure always carries an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutcome {
    row_index: u64,
    postal_code: String,
    email: String,
    resolution: Result<Location, RowFailure>,
}

impl NewOutcome {
    pub fn success(
        row_index: u64,
        postal_code: &PostalCode,
        email: &EmailAddress,
        location: Location,
    ) -> Self {
        Self {
            row_index,
            postal_code: postal_code.to_string(),
            email: email.to_string(),
            resolution: Ok(location),
        }
    }

    pub fn failure(
        row_index: u64,
        postal_code: impl Into<String>,
        email: impl Into<String>,
        failure: impl Into<RowFailure>,
    ) -> Self {
        Self {
            row_index,
            postal_code: postal_code.into(),
            email: email.into(),
            resolution: Err(failure.into()),
        }
    }

    pub fn row_index(&self) -> u64 {
        self.row_index
    }

    pub fn postal_code(&self) -> &str {
        &self.postal_code
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn is_success(&self) -> bool {
        self.resolution.is_ok()
    }

    pub fn location(&self) -> Option<&Location> {
        self.resolution.as_ref().ok()
    }

    pub fn failure_ref(&self) -> Option<&RowFailure> {
        self.resolution.as_ref().err()
    }
}
