//! Status persistence for dispatched records.

use crate::output::{DispatchStatus, MatchResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One dispatch outcome as handed to a [`StatusSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub staff_id: String,
    pub name: String,
    pub email: String,
    /// Artifact file name (not path; the artifact is gone by the time
    /// anyone reads this).
    pub file: String,
    pub status: DispatchStatus,
    pub sent_at: Option<DateTime<Utc>>,
}

impl From<&MatchResult> for StatusRecord {
    fn from(r: &MatchResult) -> Self {
        Self {
            staff_id: r.identifier.clone(),
            name: r.name.clone(),
            email: r.email.clone(),
            file: r.file_name(),
            status: r.dispatch_status,
            sent_at: r.sent_at,
        }
    }
}

/// Receives a record every time a payslip reaches a terminal status.
///
/// Errors are logged by the dispatch loop and never change the outcome.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn record(&self, status: &StatusRecord) -> std::io::Result<()>;
}

/// Appends one JSON object per line to a file.
pub struct JsonlStatusLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlStatusLog {
    /// The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StatusSink for JsonlStatusLog {
    async fn record(&self, status: &StatusRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(status)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, status: DispatchStatus) -> StatusRecord {
        StatusRecord {
            staff_id: id.into(),
            name: "Jane Doe".into(),
            email: "jane@x.com".into(),
            file: format!("{id}_Jane_Doe.pdf"),
            status,
            sent_at: None,
        }
    }

    #[tokio::test]
    async fn appends_one_json_line_per_record() {
        let dir = TempDir::new().unwrap();
        let log = JsonlStatusLog::new(dir.path().join("status.jsonl"));

        log.record(&record("1", DispatchStatus::Sent)).await.unwrap();
        log.record(&record("2", DispatchStatus::InvalidEmail)).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<StatusRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].staff_id, "1");
        assert_eq!(lines[1].status, DispatchStatus::InvalidEmail);
    }

    #[tokio::test]
    async fn existing_log_is_appended_not_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.jsonl");
        std::fs::write(&path, "{\"earlier\":true}\n").unwrap();

        JsonlStatusLog::new(&path)
            .record(&record("9", DispatchStatus::Failed))
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("{\"earlier\":true}\n"));
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn unwritable_location_errors() {
        let dir = TempDir::new().unwrap();
        let log = JsonlStatusLog::new(dir.path().join("missing/dir/status.jsonl"));
        assert!(log.record(&record("1", DispatchStatus::Sent)).await.is_err());
    }
}
