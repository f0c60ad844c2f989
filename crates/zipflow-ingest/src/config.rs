//! Pipeline configuration
//!
//! A single [`PipelineConfig`] value is built at startup (defaults, then
//! `ZIPFLOW_*` environment variables, then CLI flags) and handed to the
//! orchestrator. Nothing in the pipeline reads global settings afterwards.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use zipflow_common::EmailAddress;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Directory scanned for new input files.
pub const DEFAULT_WATCH_DIR: &str = "incoming";

/// Directory that receives fully processed input files.
pub const DEFAULT_ARCHIVE_DIR: &str = "processed";

/// SQLite file holding the audit trail.
pub const DEFAULT_DATABASE_PATH: &str = "zipflow.db";

/// Lookup service base URL; the postal code is appended as the last segment.
pub const DEFAULT_LOOKUP_BASE_URL: &str = "https://api.zippopotam.us/us";

/// Upper bound on a single lookup call.
pub const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 5;

/// Upper bound on a single notification dispatch.
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 30;

/// Period between scans in continuous mode.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 120;

/// Extension of input files, without the dot.
pub const DEFAULT_INPUT_EXTENSION: &str = "csv";

/// Sender of every notification.
pub const DEFAULT_FROM_ADDRESS: &str = "noreply@example.com";

/// Spool directory used by the file transport.
pub const DEFAULT_MAIL_SPOOL_DIR: &str = "outbox";

/// Which transport delivers notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Print each message to stdout
    #[default]
    Console,
    /// Write each message as a file under the spool directory
    File,
}

impl FromStr for TransportKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "console" | "stdout" => Ok(TransportKind::Console),
            "file" | "spool" => Ok(TransportKind::File),
            other => Err(IngestError::config(format!(
                "unknown transport '{}', expected 'console' or 'file'",
                other
            ))),
        }
    }
}

/// Everything the pipeline needs to run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    pub watch_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub database_path: PathBuf,
    pub lookup_base_url: String,
    pub lookup_timeout_secs: u64,
    pub notify_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub input_extension: String,
    pub from_address: String,
    pub transport: TransportKind,
    pub mail_spool_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from(DEFAULT_WATCH_DIR),
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            lookup_base_url: DEFAULT_LOOKUP_BASE_URL.to_string(),
            lookup_timeout_secs: DEFAULT_LOOKUP_TIMEOUT_SECS,
            notify_timeout_secs: DEFAULT_NOTIFY_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            input_extension: DEFAULT_INPUT_EXTENSION.to_string(),
            from_address: DEFAULT_FROM_ADDRESS.to_string(),
            transport: TransportKind::Console,
            mail_spool_dir: PathBuf::from(DEFAULT_MAIL_SPOOL_DIR),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load configuration from `.env` and environment variables
    ///
    /// Environment variables:
    /// - `ZIPFLOW_WATCH_DIR`, `ZIPFLOW_ARCHIVE_DIR`, `ZIPFLOW_DATABASE_PATH`
    /// - `ZIPFLOW_LOOKUP_URL`, `ZIPFLOW_LOOKUP_TIMEOUT_SECS`
    /// - `ZIPFLOW_NOTIFY_TIMEOUT_SECS`, `ZIPFLOW_POLL_INTERVAL_SECS`
    /// - `ZIPFLOW_INPUT_EXTENSION`, `ZIPFLOW_FROM_ADDRESS`
    /// - `ZIPFLOW_TRANSPORT` (`console` or `file`), `ZIPFLOW_MAIL_SPOOL_DIR`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Some(dir) = env_var("ZIPFLOW_WATCH_DIR") {
            config.watch_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_var("ZIPFLOW_ARCHIVE_DIR") {
            config.archive_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_var("ZIPFLOW_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(url) = env_var("ZIPFLOW_LOOKUP_URL") {
            config.lookup_base_url = url;
        }
        if let Some(secs) = env_secs("ZIPFLOW_LOOKUP_TIMEOUT_SECS")? {
            config.lookup_timeout_secs = secs;
        }
        if let Some(secs) = env_secs("ZIPFLOW_NOTIFY_TIMEOUT_SECS")? {
            config.notify_timeout_secs = secs;
        }
        if let Some(secs) = env_secs("ZIPFLOW_POLL_INTERVAL_SECS")? {
            config.poll_interval_secs = secs;
        }
        if let Some(ext) = env_var("ZIPFLOW_INPUT_EXTENSION") {
            config.input_extension = ext;
        }
        if let Some(from) = env_var("ZIPFLOW_FROM_ADDRESS") {
            config.from_address = from;
        }
        if let Some(transport) = env_var("ZIPFLOW_TRANSPORT") {
            config.transport = transport.parse()?;
        }
        if let Some(dir) = env_var("ZIPFLOW_MAIL_SPOOL_DIR") {
            config.mail_spool_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.lookup_timeout_secs == 0 {
            return Err(IngestError::config("lookup timeout must be at least 1 second"));
        }
        if self.notify_timeout_secs == 0 {
            return Err(IngestError::config("notify timeout must be at least 1 second"));
        }
        if self.poll_interval_secs == 0 {
            return Err(IngestError::config("poll interval must be at least 1 second"));
        }
        if self.input_extension.trim_start_matches('.').is_empty() {
            return Err(IngestError::config("input extension must not be empty"));
        }
        if !(self.lookup_base_url.starts_with("http://")
            || self.lookup_base_url.starts_with("https://"))
        {
            return Err(IngestError::config(format!(
                "lookup URL '{}' must start with http:// or https://",
                self.lookup_base_url
            )));
        }
        self.from_address.parse::<EmailAddress>()?;
        self.check_distinct_dirs()
    }

    /// Fail when the watch and archive directories resolve to the same place.
    ///
    /// Directories that do not exist yet are compared lexically, so call this
    /// again once they have been created to catch symlinked aliases.
    pub fn check_distinct_dirs(&self) -> Result<()> {
        if same_dir(&self.watch_dir, &self.archive_dir) {
            return Err(IngestError::config(format!(
                "watch and archive directories must differ (both are {})",
                self.watch_dir.display()
            )));
        }
        Ok(())
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Extension without a leading dot
    pub fn extension(&self) -> &str {
        self.input_extension.trim_start_matches('.')
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_secs(name: &str) -> Result<Option<u64>> {
    env_var(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| {
                IngestError::config(format!("{} must be a whole number of seconds, got '{}'", name, raw))
            })
        })
        .transpose()
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => normalize(a) == normalize(b),
    }
}

/// Absolute form of `path` with `.` and `..` folded away
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            other => out.push(other),
        }
    }
    out
}

/// Builder for PipelineConfig
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn watch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.watch_dir = dir.into();
        self
    }

    pub fn archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.archive_dir = dir.into();
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    pub fn lookup_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.lookup_base_url = url.into();
        self
    }

    pub fn lookup_timeout_secs(mut self, secs: u64) -> Self {
        self.config.lookup_timeout_secs = secs;
        self
    }

    pub fn notify_timeout_secs(mut self, secs: u64) -> Self {
        self.config.notify_timeout_secs = secs;
        self
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs;
        self
    }

    pub fn input_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.input_extension = ext.into();
        self
    }

    pub fn from_address(mut self, from: impl Into<String>) -> Self {
        self.config.from_address = from.into();
        self
    }

    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.config.transport = transport;
        self
    }

    pub fn mail_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.mail_spool_dir = dir.into();
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
