//! Zipflow ingestion pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Watches a directory for `zip,email` files and, for every row, resolves the
//! postal code to a city and state, notifies the address, and records the
//! outcome. Processed files are archived with a timestamped name.
//!
//! # Overview
//!
//! - **Scanning**: [`scanner::scan`] lists candidate files in a stable order
//! - **Parsing**: [`parser::RecordParser`] yields typed rows or malformed-row errors
//! - **Lookup**: [`lookup::LocationLookupClient`] calls the postal code service
//! - **Notification**: [`notify::Notifier`] composes and sends one message per row
//! - **Audit**: [`audit::SqliteAuditStore`] keeps batch and row outcomes
//! - **Archiving**: [`archive::FileArchiver`] moves finished files aside
//! - **Orchestration**: [`orchestrator::Orchestrator`] runs single passes and
//!   [`scheduler::run_continuous`] repeats them until stopped

pub mod archive;
pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod lookup;
pub mod notify;
pub mod orchestrator;
pub mod parser;
pub mod scanner;
pub mod scheduler;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{IngestError, Result};
pub use orchestrator::{Orchestrator, PassSummary};

use clap::Parser;
use std::path::PathBuf;

/// Zipflow - postal code enrichment for dropped CSV files
#[derive(Parser, Debug)]
#[command(name = "zipflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Process the watch directory once and exit; `--interval` is ignored
    #[arg(long)]
    pub once: bool,

    /// Seconds between passes in continuous mode [default: 120]
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Directory scanned for input files
    #[arg(long, value_name = "DIR")]
    pub watch_dir: Option<PathBuf>,

    /// Directory processed files are moved to
    #[arg(long, value_name = "DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Audit database file
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Lookup service base URL; the postal code is appended as a path segment
    #[arg(long, value_name = "URL")]
    pub lookup_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Overlay command line flags on `config`
    pub fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
        if let Some(dir) = &self.watch_dir {
            config.watch_dir = dir.clone();
        }
        if let Some(dir) = &self.archive_dir {
            config.archive_dir = dir.clone();
        }
        if let Some(path) = &self.database {
            config.database_path = path.clone();
        }
        if let Some(url) = &self.lookup_url {
            config.lookup_base_url = url.clone();
        }
        config
    }
}
