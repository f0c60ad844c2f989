//! Audit store trait and SQLite implementation

use crate::audit::schema;
use crate::audit::types::{BatchRecord, BatchStatus, NewOutcome, RecordOutcome};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Durable bookkeeping for batches and row outcomes.
///
/// Every error returned here is a persistence error and ends the run.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Open a batch in `processing` state
    async fn begin_batch(&self, file_name: &str, total_rows: u64) -> Result<i64>;

    /// Record the outcome of the next row.
    ///
    /// Rows must arrive exactly once each, in order: the outcome's row index
    /// must be one past the number of rows already recorded for the batch.
    async fn record_outcome(&self, batch_id: i64, outcome: NewOutcome) -> Result<i64>;

    /// Move a fully recorded batch to `completed` or `partial_failure`
    async fn finalize_batch(&self, batch_id: i64) -> Result<BatchRecord>;

    /// Move a batch to `failed`; used when the file could not be read
    async fn fail_batch(&self, batch_id: i64, reason: &str) -> Result<BatchRecord>;

    /// Remember where a finished batch's file was archived
    async fn mark_archived(&self, batch_id: i64, archived_as: &str) -> Result<()>;

    async fn get_batch(&self, batch_id: i64) -> Result<Option<BatchRecord>>;

    /// All batches, newest first
    async fn list_batches(&self) -> Result<Vec<BatchRecord>>;

    /// Outcomes of one batch in row order
    async fn list_outcomes(&self, batch_id: i64) -> Result<Vec<RecordOutcome>>;
}

/// SQLite-backed audit store
pub struct SqliteAuditStore {
    db: Arc<Mutex<Connection>>,
}

const BATCH_COLUMNS: &str = "id, file_name, total_rows, successful_rows, failed_rows, status, \
                             created_at, completed_at, archived_as, failure_reason";

impl SqliteAuditStore {
    /// Open (or create) the audit database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| IngestError::audit(format!("Failed to open audit database: {}", e)))?;

        Self::with_connection(conn)
    }

    /// In-memory store, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| IngestError::audit(format!("Failed to create in-memory database: {}", e)))?;

        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        schema::init_schema(&conn)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| IngestError::audit(format!("Failed to acquire database lock: {}", e)))
    }

    fn load_batch(conn: &Connection, batch_id: i64) -> Result<Option<BatchRecord>> {
        let sql = format!("SELECT {} FROM batches WHERE id = ?1", BATCH_COLUMNS);
        let batch = conn
            .query_row(&sql, params![batch_id], batch_from_row)
            .optional()?;
        Ok(batch)
    }

    fn require_batch(conn: &Connection, batch_id: i64) -> Result<BatchRecord> {
        Self::load_batch(conn, batch_id)?
            .ok_or_else(|| IngestError::audit(format!("batch {} does not exist", batch_id)))
    }

    fn require_processing(batch: &BatchRecord) -> Result<()> {
        if batch.status != BatchStatus::Processing {
            return Err(IngestError::audit(format!(
                "batch {} is already {}",
                batch.id, batch.status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn begin_batch(&self, file_name: &str, total_rows: u64) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO batches (file_name, total_rows, status, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                file_name,
                to_sql_count(total_rows)?,
                BatchStatus::Processing.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    async fn record_outcome(&self, batch_id: i64, outcome: NewOutcome) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let batch = Self::require_batch(&tx, batch_id)?;
        Self::require_processing(&batch)?;

        let expected = batch.successful + batch.failed + 1;
        if outcome.row_index() != expected {
            return Err(IngestError::audit(format!(
                "batch {}: row {} recorded out of order, expected row {}",
                batch_id,
                outcome.row_index(),
                expected
            )));
        }
        if outcome.row_index() > batch.total {
            return Err(IngestError::audit(format!(
                "batch {}: row {} exceeds the {} rows announced",
                batch_id,
                outcome.row_index(),
                batch.total
            )));
        }

        let location = outcome.location();
        let failure = outcome.failure_ref();

        tx.execute(
            r#"
            INSERT INTO record_outcomes (
                batch_id, row_index, postal_code, email, state, city,
                success, error_kind, error_message, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                batch_id,
                to_sql_count(outcome.row_index())?,
                outcome.postal_code(),
                outcome.email(),
                location.map(|l| l.state.as_str()),
                location.map(|l| l.city.as_str()),
                outcome.is_success(),
                failure.map(|f| f.kind()),
                failure.map(|f| f.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        let outcome_id = tx.last_insert_rowid();

        let counter = if outcome.is_success() {
            "UPDATE batches SET successful_rows = successful_rows + 1 WHERE id = ?1"
        } else {
            "UPDATE batches SET failed_rows = failed_rows + 1 WHERE id = ?1"
        };
        tx.execute(counter, params![batch_id])?;

        tx.commit()?;
        Ok(outcome_id)
    }

    async fn finalize_batch(&self, batch_id: i64) -> Result<BatchRecord> {
        let conn = self.conn()?;

        let batch = Self::require_batch(&conn, batch_id)?;
        Self::require_processing(&batch)?;

        if batch.successful + batch.failed != batch.total {
            return Err(IngestError::audit(format!(
                "batch {}: {} successful + {} failed does not match {} rows",
                batch_id, batch.successful, batch.failed, batch.total
            )));
        }

        let status = if batch.failed == 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::PartialFailure
        };

        conn.execute(
            "UPDATE batches SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), batch_id],
        )?;

        Self::require_batch(&conn, batch_id)
    }

    async fn fail_batch(&self, batch_id: i64, reason: &str) -> Result<BatchRecord> {
        let conn = self.conn()?;

        let batch = Self::require_batch(&conn, batch_id)?;
        Self::require_processing(&batch)?;

        conn.execute(
            r#"
            UPDATE batches
            SET status = ?1, failure_reason = ?2, completed_at = ?3
            WHERE id = ?4
            "#,
            params![BatchStatus::Failed.as_str(), reason, Utc::now().to_rfc3339(), batch_id],
        )?;

        Self::require_batch(&conn, batch_id)
    }

    async fn mark_archived(&self, batch_id: i64, archived_as: &str) -> Result<()> {
        let conn = self.conn()?;

        let batch = Self::require_batch(&conn, batch_id)?;
        if !batch.status.is_terminal() {
            return Err(IngestError::audit(format!(
                "batch {} cannot be archived while still processing",
                batch_id
            )));
        }

        conn.execute(
            "UPDATE batches SET archived_as = ?1 WHERE id = ?2",
            params![archived_as, batch_id],
        )?;

        Ok(())
    }

    async fn get_batch(&self, batch_id: i64) -> Result<Option<BatchRecord>> {
        let conn = self.conn()?;
        Self::load_batch(&conn, batch_id)
    }

    async fn list_batches(&self) -> Result<Vec<BatchRecord>> {
        let conn = self.conn()?;

        let sql = format!("SELECT {} FROM batches ORDER BY id DESC", BATCH_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let batches = stmt
            .query_map([], batch_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(batches)
    }

    async fn list_outcomes(&self, batch_id: i64) -> Result<Vec<RecordOutcome>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, batch_id, row_index, postal_code, email, state, city,
                   success, error_kind, error_message, recorded_at
            FROM record_outcomes
            WHERE batch_id = ?1
            ORDER BY row_index ASC
            "#,
        )?;

        let outcomes = stmt
            .query_map(params![batch_id], |row| {
                Ok(RecordOutcome {
                    id: row.get(0)?,
                    batch_id: row.get(1)?,
                    row_index: from_sql_count(row, 2)?,
                    postal_code: row.get(3)?,
                    email: row.get(4)?,
                    state: row.get(5)?,
                    city: row.get(6)?,
                    success: row.get(7)?,
                    error_kind: row.get(8)?,
                    error_message: row.get(9)?,
                    recorded_at: timestamp(row, 10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(outcomes)
    }
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<BatchRecord> {
    let status_str = row.get::<_, String>(5)?;
    let status = status_str.parse::<BatchStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let completed_at = match row.get::<_, Option<String>>(7)? {
        Some(_) => Some(timestamp(row, 7)?),
        None => None,
    };

    Ok(BatchRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        total: from_sql_count(row, 2)?,
        successful: from_sql_count(row, 3)?,
        failed: from_sql_count(row, 4)?,
        status,
        created_at: timestamp(row, 6)?,
        completed_at,
        archived_as: row.get(8)?,
        failure_reason: row.get(9)?,
    })
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text = row.get::<_, String>(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn from_sql_count(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value = row.get::<_, i64>(idx)?;
    u64::try_from(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}

fn to_sql_count(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| IngestError::audit(format!("row count {} out of range", value)))
}
