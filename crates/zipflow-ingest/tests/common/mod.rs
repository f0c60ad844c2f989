//! Shared fixtures for pipeline integration tests
//!
//! [`TestPipeline`] wires a real orchestrator to an in-memory audit store, a
//! scripted lookup service and a capturing transport, all rooted in a
//! temporary directory.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use zipflow_common::{Location, PostalCode};
use zipflow_ingest::archive::FileArchiver;
use zipflow_ingest::audit::{AuditStore, BatchRecord, NewOutcome, RecordOutcome, SqliteAuditStore};
use zipflow_ingest::events::RecordingEventSink;
use zipflow_ingest::lookup::{LocationLookup, LookupError};
use zipflow_ingest::notify::{Message, Notifier, NotifyError, Transport};
use zipflow_ingest::{IngestError, Orchestrator, PipelineConfig};

/// Lookup service answering from a fixed table; unknown codes are not found
#[derive(Default)]
pub struct ScriptedLookup {
    answers: HashMap<String, Result<Location, LookupError>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, code: &str, answer: Result<Location, LookupError>) -> Self {
        self.answers.insert(code.to_string(), answer);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocationLookup for ScriptedLookup {
    async fn lookup(&self, postal_code: &PostalCode) -> Result<Location, LookupError> {
        self.calls.lock().unwrap().push(postal_code.to_string());
        self.answers
            .get(postal_code.as_str())
            .cloned()
            .unwrap_or(Err(LookupError::NotFound))
    }
}

/// Keeps every message; optionally refuses one recipient
#[derive(Default)]
pub struct CaptureTransport {
    sent: Mutex<Vec<Message>>,
    refuse: Option<String>,
}

impl CaptureTransport {
    pub fn refusing(recipient: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            refuse: Some(recipient.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for CaptureTransport {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        if self.refuse.as_deref() == Some(message.to.as_str()) {
            return Err(NotifyError::delivery("mailbox unavailable"));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct TestPipeline {
    pub dir: TempDir,
    pub watch_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub store: Arc<SqliteAuditStore>,
    pub transport: Arc<CaptureTransport>,
    pub events: Arc<RecordingEventSink>,
    pub orchestrator: Orchestrator,
}

impl TestPipeline {
    pub fn new(lookup: Arc<dyn LocationLookup>) -> Self {
        Self::with_transport(lookup, Arc::new(CaptureTransport::default()))
    }

    pub fn with_transport(lookup: Arc<dyn LocationLookup>, transport: Arc<CaptureTransport>) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteAuditStore::open_in_memory().unwrap());
        Self::assemble(dir, lookup, transport, store.clone(), store)
    }

    /// Pipeline whose audit store is `store` instead of the SQLite one
    pub fn with_store(lookup: Arc<dyn LocationLookup>, store: Arc<dyn AuditStore>) -> Self {
        let dir = TempDir::new().unwrap();
        let sqlite = Arc::new(SqliteAuditStore::open_in_memory().unwrap());
        Self::assemble(dir, lookup, Arc::new(CaptureTransport::default()), sqlite, store)
    }

    fn assemble(
        dir: TempDir,
        lookup: Arc<dyn LocationLookup>,
        transport: Arc<CaptureTransport>,
        sqlite: Arc<SqliteAuditStore>,
        store: Arc<dyn AuditStore>,
    ) -> Self {
        let watch_dir = dir.path().join("incoming");
        let archive_dir = dir.path().join("processed");

        let config = PipelineConfig::builder()
            .watch_dir(&watch_dir)
            .archive_dir(&archive_dir)
            .database_path(dir.path().join("unused.db"))
            .build();

        let events = Arc::new(RecordingEventSink::new());
        let notifier = Notifier::new(transport.clone(), "noreply@example.com", Duration::from_secs(5));

        let orchestrator = Orchestrator::new(
            config,
            lookup,
            notifier,
            store,
            FileArchiver::new(&archive_dir),
            events.clone(),
        );
        orchestrator.ensure_directories().unwrap();

        Self {
            dir,
            watch_dir,
            archive_dir,
            store: sqlite,
            transport,
            events,
            orchestrator,
        }
    }

    pub fn drop_file(&self, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.watch_dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn archived_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.archive_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Audit store whose database has gone away
pub struct UnavailableStore;

#[async_trait]
impl AuditStore for UnavailableStore {
    async fn begin_batch(&self, _file_name: &str, _total_rows: u64) -> zipflow_ingest::Result<i64> {
        Err(IngestError::audit("database is locked"))
    }

    async fn record_outcome(&self, _batch_id: i64, _outcome: NewOutcome) -> zipflow_ingest::Result<i64> {
        Err(IngestError::audit("database is locked"))
    }

    async fn finalize_batch(&self, _batch_id: i64) -> zipflow_ingest::Result<BatchRecord> {
        Err(IngestError::audit("database is locked"))
    }

    async fn fail_batch(&self, _batch_id: i64, _reason: &str) -> zipflow_ingest::Result<BatchRecord> {
        Err(IngestError::audit("database is locked"))
    }

    async fn mark_archived(&self, _batch_id: i64, _archived_as: &str) -> zipflow_ingest::Result<()> {
        Err(IngestError::audit("database is locked"))
    }

    async fn get_batch(&self, _batch_id: i64) -> zipflow_ingest::Result<Option<BatchRecord>> {
        Err(IngestError::audit("database is locked"))
    }

    async fn list_batches(&self) -> zipflow_ingest::Result<Vec<BatchRecord>> {
        Err(IngestError::audit("database is locked"))
    }

    async fn list_outcomes(&self, _batch_id: i64) -> zipflow_ingest::Result<Vec<RecordOutcome>> {
        Err(IngestError::audit("database is locked"))
    }
}

pub fn beverly_hills() -> Location {
    Location::new("California", "Beverly Hills")
}
