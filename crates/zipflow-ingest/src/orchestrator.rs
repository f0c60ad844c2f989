//! Single-pass ingestion
//!
//! One pass scans the watch directory and takes each file, in listing order,
//! through parse → lookup → notify → record → finalize → archive. Everything
//! is sequential. Row failures are recorded and the file carries on; file
//! failures are recorded and the pass carries on; persistence failures end
//! the pass with an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::archive::FileArchiver;
use crate::audit::{AuditStore, BatchRecord, BatchStatus, NewOutcome, SqliteAuditStore};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::events::{EventSink, PipelineEvent, TracingEventSink};
use crate::lookup::{LocationLookup, LocationLookupClient};
use crate::notify::Notifier;
use crate::parser::{ParsedRow, RecordParser};
use crate::scanner;

/// Totals for one pass over the watch directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub files_seen: usize,
    pub batches_completed: usize,
    pub batches_partial: usize,
    pub batches_failed: usize,
    pub rows_succeeded: u64,
    pub rows_failed: u64,
    pub files_archived: usize,
    pub archive_failures: usize,
    /// Files left untouched because a stop was requested
    pub files_skipped: usize,
}

impl PassSummary {
    pub fn files_processed(&self) -> usize {
        self.batches_completed + self.batches_partial + self.batches_failed
    }

    fn absorb(&mut self, report: &FileReport) {
        match report.batch.status {
            BatchStatus::Completed => self.batches_completed += 1,
            BatchStatus::PartialFailure => self.batches_partial += 1,
            BatchStatus::Failed | BatchStatus::Processing => self.batches_failed += 1,
        }
        self.rows_succeeded += report.batch.successful;
        self.rows_failed += report.batch.failed;

        if report.archived_to.is_some() {
            self.files_archived += 1;
        } else if report.batch.status != BatchStatus::Failed {
            self.archive_failures += 1;
        }
    }
}

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    /// Terminal batch record
    pub batch: BatchRecord,
    /// Where the file went; `None` if it is still in the watch directory
    pub archived_to: Option<PathBuf>,
}

/// Drives the pipeline over the watch directory
pub struct Orchestrator {
    config: PipelineConfig,
    lookup: Arc<dyn LocationLookup>,
    notifier: Notifier,
    store: Arc<dyn AuditStore>,
    archiver: FileArchiver,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        lookup: Arc<dyn LocationLookup>,
        notifier: Notifier,
        store: Arc<dyn AuditStore>,
        archiver: FileArchiver,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            lookup,
            notifier,
            store,
            archiver,
            events,
        }
    }

    /// Wire up the production components described by `config`
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let lookup = Arc::new(LocationLookupClient::from_config(&config)?);
        let notifier = Notifier::from_config(&config);
        let store = Arc::new(SqliteAuditStore::open(&config.database_path)?);
        let archiver = FileArchiver::new(&config.archive_dir);

        Ok(Self::new(
            config,
            lookup,
            notifier,
            store,
            archiver,
            Arc::new(TracingEventSink),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Create the watch and archive directories if they are missing.
    ///
    /// Once both exist they are compared again by their resolved paths, which
    /// catches aliases such as symlinks that `validate` could not see.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config.watch_dir, &self.config.archive_dir] {
            if !dir.is_dir() {
                info!(dir = %dir.display(), "Creating directory");
                std::fs::create_dir_all(dir)?;
            }
        }
        self.config.check_distinct_dirs()
    }

    /// Process every input file currently in the watch directory.
    ///
    /// `cancel` is checked before each file; a file that has started always
    /// runs to completion.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<PassSummary> {
        let files = scanner::scan(&self.config.watch_dir, self.config.extension())?;

        self.events.emit(&PipelineEvent::ScanCompleted {
            watch_dir: self.config.watch_dir.clone(),
            files: files.len(),
        });

        let mut summary = PassSummary {
            files_seen: files.len(),
            ..Default::default()
        };

        for (position, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.files_skipped = files.len() - position;
                info!(remaining = summary.files_skipped, "Stop requested, leaving remaining files for the next run");
                break;
            }

            let report = self.process_file(path).await?;
            summary.absorb(&report);
        }

        debug!(?summary, "Pass finished");
        Ok(summary)
    }

    /// Take one file through the whole pipeline.
    ///
    /// Only persistence errors are returned; an unreadable file or a failed
    /// archive move is reported in the [`FileReport`].
    pub async fn process_file(&self, path: &Path) -> Result<FileReport> {
        let file = file_name(path);
        self.events.emit(&PipelineEvent::FileStarted { file: file.clone() });

        let rows = match RecordParser::read_all(path) {
            Ok(rows) => rows,
            Err(e) => {
                let reason = e.to_string();
                let batch_id = self.store.begin_batch(&file, 0).await?;
                let batch = self.store.fail_batch(batch_id, &reason).await?;

                self.events.emit(&PipelineEvent::FileFailed {
                    file,
                    batch_id,
                    reason,
                });

                return Ok(FileReport {
                    batch,
                    archived_to: None,
                });
            },
        };

        let batch_id = self.store.begin_batch(&file, rows.len() as u64).await?;

        for parsed in rows {
            let outcome = self.resolve(parsed).await;
            let event = outcome_event(&file, &outcome);
            self.store.record_outcome(batch_id, outcome).await?;
            if let Some(event) = event {
                self.events.emit(&event);
            }
        }

        let batch = self.store.finalize_batch(batch_id).await?;
        self.events.emit(&PipelineEvent::FileCompleted {
            file: file.clone(),
            batch_id,
            status: batch.status,
            total: batch.total,
            successful: batch.successful,
            failed: batch.failed,
        });

        let archived_to = match self.archiver.archive(path) {
            Ok(destination) => {
                let archived_as = file_name(&destination);
                self.store.mark_archived(batch_id, &archived_as).await?;
                self.events.emit(&PipelineEvent::FileArchived {
                    file,
                    destination: destination.clone(),
                });
                Some(destination)
            },
            Err(e) => {
                self.events.emit(&PipelineEvent::ArchiveFailed {
                    file,
                    reason: e.to_string(),
                });
                None
            },
        };

        let batch = self.store.get_batch(batch_id).await?.unwrap_or(batch);
        Ok(FileReport { batch, archived_to })
    }

    /// Lookup then notify; any failure along the way becomes the outcome
    async fn resolve(&self, parsed: ParsedRow) -> NewOutcome {
        let row = match parsed {
            Ok(row) => row,
            Err(malformed) => {
                return NewOutcome::failure(
                    malformed.index,
                    malformed.raw_postal_code.clone(),
                    malformed.raw_email.clone(),
                    malformed,
                );
            },
        };

        let location = match self.lookup.lookup(&row.postal_code).await {
            Ok(location) => location,
            Err(e) => {
                return NewOutcome::failure(
                    row.index,
                    row.postal_code.to_string(),
                    row.email.to_string(),
                    e,
                );
            },
        };

        match self
            .notifier
            .notify(&row.email, &row.postal_code, &location)
            .await
        {
            Ok(()) => NewOutcome::success(row.index, &row.postal_code, &row.email, location),
            Err(e) => {
                NewOutcome::failure(row.index, row.postal_code.to_string(), row.email.to_string(), e)
            },
        }
    }
}

fn outcome_event(file: &str, outcome: &NewOutcome) -> Option<PipelineEvent> {
    if let Some(location) = outcome.location() {
        return Some(PipelineEvent::RowSucceeded {
            file: file.to_string(),
            row: outcome.row_index(),
            email: outcome.email().to_string(),
            postal_code: outcome.postal_code().to_string(),
            state: location.state.clone(),
            city: location.city.clone(),
        });
    }

    outcome.failure_ref().map(|failure| PipelineEvent::RowFailed {
        file: file.to_string(),
        row: outcome.row_index(),
        kind: failure.kind(),
        error: failure.to_string(),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn batch(status: BatchStatus, successful: u64, failed: u64) -> BatchRecord {
        BatchRecord {
            id: 1,
            file_name: "a.csv".into(),
            total: successful + failed,
            successful,
            failed,
            status,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
            archived_as: None,
            failure_reason: None,
        }
    }

    #[test]
    fn test_summary_absorbs_reports() {
        let mut summary = PassSummary::default();

        summary.absorb(&FileReport {
            batch: batch(BatchStatus::PartialFailure, 1, 1),
            archived_to: Some(PathBuf::from("processed/a_20240101000000.csv")),
        });
        summary.absorb(&FileReport {
            batch: batch(BatchStatus::Completed, 3, 0),
            archived_to: None,
        });
        summary.absorb(&FileReport {
            batch: batch(BatchStatus::Failed, 0, 0),
            archived_to: None,
        });

        assert_eq!(summary.batches_partial, 1);
        assert_eq!(summary.batches_completed, 1);
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.files_processed(), 3);
        assert_eq!(summary.rows_succeeded, 4);
        assert_eq!(summary.rows_failed, 1);
        assert_eq!(summary.files_archived, 1);
        // The failed batch is never archived, so only the completed one counts
        assert_eq!(summary.archive_failures, 1);
    }
}
