//! Pipeline events
//!
//! The orchestrator reports what it does through an [`EventSink`] handed to
//! it at construction. [`TracingEventSink`] turns events into log lines;
//! [`RecordingEventSink`] keeps them for later inspection. The audit store,
//! not this stream, is the source of truth for outcomes.

use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::audit::BatchStatus;

/// Something observable that happened during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    ScanCompleted {
        watch_dir: PathBuf,
        files: usize,
    },
    FileStarted {
        file: String,
    },
    RowSucceeded {
        file: String,
        row: u64,
        email: String,
        postal_code: String,
        state: String,
        city: String,
    },
    RowFailed {
        file: String,
        row: u64,
        kind: &'static str,
        error: String,
    },
    FileCompleted {
        file: String,
        batch_id: i64,
        status: BatchStatus,
        total: u64,
        successful: u64,
        failed: u64,
    },
    FileFailed {
        file: String,
        batch_id: i64,
        reason: String,
    },
    FileArchived {
        file: String,
        destination: PathBuf,
    },
    ArchiveFailed {
        file: String,
        reason: String,
    },
    IterationFailed {
        reason: String,
    },
}

/// Receiver for pipeline events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ScanCompleted { watch_dir, files: 0 } => {
                info!(watch_dir = %watch_dir.display(), "No input files found");
            },
            PipelineEvent::ScanCompleted { watch_dir, files } => {
                info!(watch_dir = %watch_dir.display(), files, "Found input file(s) to process");
            },
            PipelineEvent::FileStarted { file } => {
                info!(file = %file, "Processing input file");
            },
            PipelineEvent::RowSucceeded {
                file,
                row,
                email,
                postal_code,
                state,
                city,
            } => {
                info!(
                    file = %file,
                    row,
                    email = %email,
                    zip = %postal_code,
                    state = %state,
                    city = %city,
                    "Notification sent"
                );
            },
            PipelineEvent::RowFailed {
                file,
                row,
                kind,
                error,
            } => {
                warn!(file = %file, row, kind, error = %error, "Row failed");
            },
            PipelineEvent::FileCompleted {
                file,
                batch_id,
                status,
                total,
                successful,
                failed,
            } => {
                info!(
                    file = %file,
                    batch_id,
                    status = %status,
                    total,
                    successful,
                    failed,
                    "Completed processing {}: {}/{} rows successful",
                    file,
                    successful,
                    total
                );
            },
            PipelineEvent::FileFailed {
                file,
                batch_id,
                reason,
            } => {
                error!(file = %file, batch_id, reason = %reason, "Input file could not be processed");
            },
            PipelineEvent::FileArchived { file, destination } => {
                info!(file = %file, destination = %destination.display(), "Moved processed file");
            },
            PipelineEvent::ArchiveFailed { file, reason } => {
                error!(file = %file, reason = %reason, "Failed to archive file, leaving it for the next scan");
            },
            PipelineEvent::IterationFailed { reason } => {
                error!(reason = %reason, "Scan iteration failed");
            },
        }
    }
}

/// Keeps events in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
