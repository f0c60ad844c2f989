//! SQLite schema for the audit trail

use crate::error::Result;
use rusqlite::Connection;

/// Initialize audit database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    // One row per input file
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_name TEXT NOT NULL,

            -- Row counters
            total_rows INTEGER NOT NULL DEFAULT 0 CHECK (total_rows >= 0),
            successful_rows INTEGER NOT NULL DEFAULT 0 CHECK (successful_rows >= 0),
            failed_rows INTEGER NOT NULL DEFAULT 0 CHECK (failed_rows >= 0),

            status TEXT NOT NULL DEFAULT 'processing',
            failure_reason TEXT,
            archived_as TEXT,

            created_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
        [],
    )?;

    // One row per input row, never updated
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS record_outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id INTEGER NOT NULL,
            row_index INTEGER NOT NULL,

            postal_code TEXT NOT NULL,
            email TEXT NOT NULL,
            state TEXT,
            city TEXT,

            success BOOLEAN NOT NULL,
            error_kind TEXT,
            error_message TEXT,

            recorded_at TEXT NOT NULL,

            UNIQUE(batch_id, row_index),
            CHECK (
                (success = 1 AND error_message IS NULL AND state IS NOT NULL AND city IS NOT NULL)
                OR (success = 0 AND error_message IS NOT NULL AND error_message <> '')
            ),
            FOREIGN KEY(batch_id) REFERENCES batches(id) ON DELETE CASCADE
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_record_outcomes_batch ON record_outcomes(batch_id, row_index)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batches_created ON batches(created_at DESC)",
        [],
    )?;

    Ok(())
}
