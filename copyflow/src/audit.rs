//! Audit log for rewrite runs.
//!
//! Every batch exchange (full prompt, full response) and every per-text
//! accept/reject decision is written as an [`AuditRecord`]. Storage is up to
//! the sink; the record content is fixed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn, Level};

/// Kind of audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A text was selected for rewriting.
    TextAccepted,
    /// A text was left alone.
    TextRejected,
    /// Prompt sent for one batch.
    BatchRequest,
    /// Raw response received for one batch.
    BatchResponse,
    /// A batch request failed.
    BatchFailed,
    /// Outcome of structural validation.
    Validation,
    /// Texts that would have been sent in dry-run mode.
    DryRun,
}

impl AuditKind {
    /// Returns the snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextAccepted => "text_accepted",
            Self::TextRejected => "text_rejected",
            Self::BatchRequest => "batch_request",
            Self::BatchResponse => "batch_response",
            Self::BatchFailed => "batch_failed",
            Self::Validation => "validation",
            Self::DryRun => "dry_run",
        }
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
    /// Title of the page being rewritten.
    pub page_title: String,
    /// What happened.
    pub kind: AuditKind,
    /// Kind-specific payload.
    pub detail: serde_json::Value,
}

impl AuditRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(page_title: impl Into<String>, kind: AuditKind, detail: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            page_title: page_title.into(),
            kind,
            detail,
        }
    }
}

/// Receives audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records an entry.
    ///
    /// Never fails; storage errors are logged by the sink.
    async fn emit(&self, record: AuditRecord);
}

/// Discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditSink;

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn emit(&self, _record: AuditRecord) {}
}

/// Writes records through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingAuditSink {
    level: Level,
}

impl Default for LoggingAuditSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingAuditSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_record(&self, record: &AuditRecord) {
        if self.level == Level::INFO {
            info!(
                page_title = %record.page_title,
                kind = record.kind.as_str(),
                detail = %record.detail,
                "Audit: {}", record.kind.as_str()
            );
        } else {
            debug!(
                page_title = %record.page_title,
                kind = record.kind.as_str(),
                detail = %record.detail,
                "Audit: {}", record.kind.as_str()
            );
        }
    }
}

#[async_trait]
impl AuditSink for LoggingAuditSink {
    async fn emit(&self, record: AuditRecord) {
        self.log_record(&record);
    }
}

/// Keeps records in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl CollectingAuditSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected records.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns records of one kind.
    #[must_use]
    pub fn records_of_kind(&self, kind: AuditKind) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for CollectingAuditSink {
    async fn emit(&self, record: AuditRecord) {
        self.records.write().push(record);
    }
}

/// Appends records as JSON lines to a file.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditSink {
    /// Creates a sink writing to `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(record: &AuditRecord) -> Option<Vec<u8>> {
        match serde_json::to_vec(record) {
            Ok(mut line) => {
                line.push(b'\n');
                Some(line)
            }
            Err(e) => {
                warn!(error = %e, "Failed to encode audit record");
                None
            }
        }
    }

    async fn append(&self, line: &[u8]) -> std::io::Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line).await?;
        file.flush().await
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn emit(&self, record: AuditRecord) {
        let Some(line) = Self::encode(&record) else {
            return;
        };
        if let Err(e) = self.append(&line).await {
            warn!(path = %self.path.display(), error = %e, "Failed to write audit record");
        }
    }
}
