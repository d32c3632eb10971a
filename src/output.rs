//! Result types produced by a batch run.
//!
//! Everything here is plain data and derives `Serialize` so the CLI can emit
//! `--json` output and callers can persist a report verbatim.

use crate::error::PageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How the text of a page was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Read from the PDF's embedded text layer.
    EmbeddedText,
    /// Recovered by rasterising the page and running OCR.
    OpticalRecognition,
    /// No usable text (every tier failed).
    None,
}

/// Text recovered from one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// 0-indexed page number, stable for the lifetime of the document.
    pub index: usize,
    /// Whitespace-normalised page text; empty when nothing was recovered.
    pub raw_text: String,
    pub extraction_method: ExtractionMethod,
    /// Set when a recovery tier failed and the page was given up on.
    pub error: Option<PageError>,
}

impl PageRecord {
    /// A page on which every extraction tier failed.
    pub fn unreadable(index: usize, error: PageError) -> Self {
        Self {
            index,
            raw_text: String::new(),
            extraction_method: ExtractionMethod::None,
            error: Some(error),
        }
    }
}

/// Delivery outcome of one matched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchStatus {
    /// Matched and extracted but not yet dispatched.
    Pending,
    /// The transport accepted the message.
    Sent,
    /// The transport answered with a rejection.
    Failed,
    /// The roster address failed syntactic validation; nothing was sent.
    InvalidEmail,
    /// The send attempt itself errored or panicked.
    FailedException,
}

impl DispatchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DispatchStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispatchStatus::Pending => "Pending",
            DispatchStatus::Sent => "Sent",
            DispatchStatus::Failed => "Failed",
            DispatchStatus::InvalidEmail => "Invalid Email",
            DispatchStatus::FailedException => "Failed (Exception)",
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page that matched a roster entry, and what became of it.
///
/// Created by the page scan with [`DispatchStatus::Pending`]; the dispatch
/// controller sets `dispatch_status`, `sent_at` and `detail` exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// 0-indexed page the record was found on.
    pub page_index: usize,
    pub identifier: String,
    pub name: String,
    pub email: String,
    /// Single-page PDF extracted for this record.
    pub artifact_path: PathBuf,
    pub extraction_method: ExtractionMethod,
    pub dispatch_status: DispatchStatus,
    /// Set only when `dispatch_status` is [`DispatchStatus::Sent`].
    pub sent_at: Option<DateTime<Utc>>,
    /// Rejection reason or error message for non-`Sent` outcomes.
    pub detail: Option<String>,
}

impl MatchResult {
    /// File name of the artifact, used for attachment naming and reports.
    pub fn file_name(&self) -> String {
        self.artifact_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> DispatchSummary {
        DispatchSummary {
            staff_id: self.identifier.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            status: self.dispatch_status,
        }
    }
}

/// One row of the response returned to whoever uploaded the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub staff_id: String,
    pub name: String,
    pub email: String,
    pub status: DispatchStatus,
}

/// Aggregate statistics for a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_pages: usize,
    pub roster_entries: usize,
    /// Pages whose text came from the embedded text layer.
    pub embedded_text_pages: usize,
    /// Pages whose text came from OCR.
    pub ocr_pages: usize,
    pub matched_pages: usize,
    pub unmatched_pages: usize,
    /// Matched pages whose artifact could not be written.
    pub artifact_failures: usize,
    pub sent: usize,
    pub failed: usize,
    pub invalid_email: usize,
    pub failed_exception: usize,
    pub scan_duration_ms: u64,
    pub dispatch_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl BatchStats {
    /// Fold dispatch outcomes into the per-status counters.
    pub fn count_outcomes(&mut self, results: &[MatchResult]) {
        for r in results {
            match r.dispatch_status {
                DispatchStatus::Sent => self.sent += 1,
                DispatchStatus::Failed => self.failed += 1,
                DispatchStatus::InvalidEmail => self.invalid_email += 1,
                DispatchStatus::FailedException => self.failed_exception += 1,
                DispatchStatus::Pending => {}
            }
        }
    }
}

/// Complete outcome of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Every matched record, in page order, with its dispatch outcome.
    pub results: Vec<MatchResult>,
    /// 0-indexed pages no roster entry matched. Empty unless the unmatched
    /// policy is [`crate::config::UnmatchedPolicy::Report`].
    pub unmatched_pages: Vec<usize>,
    /// Recoverable page failures (OCR, artifact writes).
    pub page_errors: Vec<PageError>,
    pub stats: BatchStats,
}

impl BatchReport {
    /// The `{staff_id, name, email, status}` rows for every matched record.
    pub fn summaries(&self) -> Vec<DispatchSummary> {
        self.results.iter().map(MatchResult::summary).collect()
    }
}
