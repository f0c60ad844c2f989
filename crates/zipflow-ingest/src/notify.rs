//! Per-row notifications
//!
//! [`Notifier`] composes the message for a resolved row and hands it to a
//! [`Transport`]. The orchestrator only sees the notifier, so swapping the
//! console sink for a real delivery channel does not touch it.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use zipflow_common::{EmailAddress, Location, PostalCode};

use crate::config::{PipelineConfig, TransportKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl NotifyError {
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delivery(_) => "delivery_error",
        }
    }
}

/// A composed notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Message {
    /// Render as an RFC 822 style text message
    pub fn render(&self, date: DateTime<Utc>) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\n\r\n{}\r\n",
            self.from,
            self.to,
            self.subject,
            date.to_rfc2822(),
            self.body.replace('\n', "\r\n")
        )
    }
}

/// Build the notification for one resolved row.
pub fn compose(
    from: &str,
    to: &EmailAddress,
    postal_code: &PostalCode,
    location: &Location,
) -> Message {
    Message {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!("Location Information for ZIP {}", postal_code),
        body: format!(
            "Hello,\n\nHere is the location information for ZIP code {}:\n\nCity: {}\nState: {}\n\nThank you!",
            postal_code, location.city, location.state
        ),
    }
}

/// Delivery channel for composed messages
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &Message) -> std::result::Result<(), NotifyError>;
}

/// Writes each message to standard output
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, message: &Message) -> std::result::Result<(), NotifyError> {
        let rendered = message.render(Utc::now());
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", rendered.replace("\r\n", "\n"))
            .and_then(|_| stdout.flush())
            .map_err(|e| NotifyError::delivery(e.to_string()))
    }
}

/// Writes each message as its own `.eml` file in a spool directory
#[derive(Debug)]
pub struct FileTransport {
    spool_dir: PathBuf,
    sequence: AtomicU64,
}

impl FileTransport {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn send(&self, message: &Message) -> std::result::Result<(), NotifyError> {
        tokio::fs::create_dir_all(&self.spool_dir)
            .await
            .map_err(|e| NotifyError::delivery(format!("cannot create spool directory: {}", e)))?;

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{:06}.eml", Local::now().format("%Y%m%d%H%M%S%6f"), seq);
        let path = self.spool_dir.join(name);

        tokio::fs::write(&path, message.render(Utc::now()))
            .await
            .map_err(|e| NotifyError::delivery(format!("cannot write {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), to = %message.to, "Spooled message");
        Ok(())
    }
}

/// Composes and dispatches notifications with a bounded wait
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
    from: String,
    timeout: Duration,
}

impl Notifier {
    pub fn new(transport: Arc<dyn Transport>, from: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            from: from.into(),
            timeout,
        }
    }

    /// Notifier with the transport selected in `config`
    pub fn from_config(config: &PipelineConfig) -> Self {
        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Console => Arc::new(ConsoleTransport),
            TransportKind::File => Arc::new(FileTransport::new(&config.mail_spool_dir)),
        };
        Self::new(transport, config.from_address.clone(), config.notify_timeout())
    }

    pub async fn notify(
        &self,
        to: &EmailAddress,
        postal_code: &PostalCode,
        location: &Location,
    ) -> std::result::Result<(), NotifyError> {
        let message = compose(&self.from, to, postal_code, location);

        match tokio::time::timeout(self.timeout, self.transport.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::delivery(format!(
                "no confirmation from transport within {}s",
                self.timeout.as_secs_f64()
            ))),
        }
    }
}
