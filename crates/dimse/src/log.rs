//! DIMSE audit log
//!
//! Each association keeps an append-only record of its ACSE and DIMSE
//! traffic. The record is flushed once, at teardown, through a [`LogSink`].
//! Flushing is best effort: a failing sink never fails the teardown.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::DimseCommand;
use crate::Result;

/// Direction of a logged message, seen from the SCP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Received,
    Sent,
}

/// ACSE level messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcseKind {
    AssociateRequest,
    AssociateAccept,
    AssociateReject,
    ReleaseRequest,
    ReleaseResponse,
    Abort,
}

/// What kind of message an entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Acse(AcseKind),
    Request(DimseCommand),
    Response(DimseCommand),
}

impl MessageKind {
    fn is_acse(&self) -> bool {
        matches!(self, MessageKind::Acse(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub direction: Direction,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Traffic record of one association
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseLog {
    pub id: Uuid,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub started: DateTime<Utc>,
    acse: Vec<LogEntry>,
    dimse: Vec<LogEntry>,
}

impl DimseLog {
    pub fn new(calling_ae_title: impl Into<String>, called_ae_title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            calling_ae_title: calling_ae_title.into(),
            called_ae_title: called_ae_title.into(),
            started: Utc::now(),
            acse: Vec::new(),
            dimse: Vec::new(),
        }
    }

    /// Append an entry to the ACSE or DIMSE sequence
    pub fn record(
        &mut self,
        direction: Direction,
        kind: MessageKind,
        timestamp: DateTime<Utc>,
        text: impl Into<String>,
    ) {
        let entry = LogEntry {
            direction,
            kind,
            timestamp,
            text: text.into(),
        };
        if kind.is_acse() {
            self.acse.push(entry);
        } else {
            self.dimse.push(entry);
        }
    }

    /// Record an entry stamped with the current time
    pub fn record_now(&mut self, direction: Direction, kind: MessageKind, text: impl Into<String>) {
        self.record(direction, kind, Utc::now(), text);
    }

    pub fn acse_entries(&self) -> &[LogEntry] {
        &self.acse
    }

    pub fn dimse_entries(&self) -> &[LogEntry] {
        &self.dimse
    }

    pub fn is_empty(&self) -> bool {
        self.acse.is_empty() && self.dimse.is_empty()
    }

    /// Flush into `sink`, logging instead of failing
    pub async fn flush(&self, sink: &dyn LogSink) {
        if let Err(e) = sink.flush(self).await {
            warn!("Failed to flush DIMSE log {}: {}", self.id, e);
        }
    }
}

/// Destination of flushed DIMSE logs
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn flush(&self, log: &DimseLog) -> Result<()>;
}

/// Discards every log
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

#[async_trait]
impl LogSink for NullLogSink {
    async fn flush(&self, _log: &DimseLog) -> Result<()> {
        Ok(())
    }
}

/// Writes each log as a JSON document into a directory
#[derive(Debug, Clone)]
pub struct FileLogSink {
    dir: PathBuf,
}

impl FileLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, log: &DimseLog) -> PathBuf {
        let calling: String = log
            .calling_ae_title
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!(
            "{}_{}_{}.json",
            log.started.format("%Y%m%dT%H%M%S"),
            calling,
            log.id
        ))
    }
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn flush(&self, log: &DimseLog) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(log);
        let json = serde_json::to_vec_pretty(log)?;
        tokio::fs::write(&path, json).await?;
        debug!("DIMSE log written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DimseError;

    struct FailingSink;

    #[async_trait]
    impl LogSink for FailingSink {
        async fn flush(&self, _log: &DimseLog) -> Result<()> {
            Err(DimseError::internal("disk full"))
        }
    }

    #[test]
    fn test_record_separates_sequences() {
        let mut log = DimseLog::new("MODALITY", "PRINT_SCP");
        log.record_now(
            Direction::Received,
            MessageKind::Acse(AcseKind::AssociateRequest),
            "A-ASSOCIATE-RQ",
        );
        log.record_now(
            Direction::Received,
            MessageKind::Request(DimseCommand::NCreate),
            "N-CREATE-RQ",
        );
        log.record_now(
            Direction::Sent,
            MessageKind::Response(DimseCommand::NCreate),
            "N-CREATE-RSP",
        );

        assert_eq!(log.acse_entries().len(), 1);
        assert_eq!(log.dimse_entries().len(), 2);
        assert_eq!(log.dimse_entries()[1].direction, Direction::Sent);
    }

    #[tokio::test]
    async fn test_file_sink_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(dir.path().join("dimse"));
        let mut log = DimseLog::new("MOD/1", "PRINT_SCP");
        log.record_now(Direction::Sent, MessageKind::Acse(AcseKind::ReleaseResponse), "A-RELEASE-RP");

        sink.flush(&log).await.unwrap();

        let mut entries = std::fs::read_dir(dir.path().join("dimse")).unwrap();
        let path = entries.next().unwrap().unwrap().path();
        assert!(path.file_name().unwrap().to_string_lossy().contains("MOD_1"));
        let parsed: DimseLog = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(parsed.acse_entries().len(), 1);
        assert_eq!(parsed.calling_ae_title, "MOD/1");
    }

    #[tokio::test]
    async fn test_failing_flush_is_swallowed() {
        let log = DimseLog::new("A", "B");
        // must not panic or propagate
        log.flush(&FailingSink).await;
    }
}
