//! Error types for the payslip-mailer library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`BatchError`] is **fatal**: the batch cannot proceed at all (unreadable
//!   roster, corrupt PDF, no mail transport configured). Returned as
//!   `Err(BatchError)` from [`crate::batch::process_batch`]. Nothing is sent
//!   once one of these is raised.
//!
//! * [`PageError`] is **non-fatal**: a single page could not be recognised or
//!   its artifact could not be written. The page simply drops out of the
//!   matched set and is listed in [`crate::output::BatchReport::page_errors`].
//!
//! * [`TransportError`] is raised by a [`crate::dispatch::MailTransport`] when
//!   an attempt blew up (connection refused, malformed message). The dispatch
//!   loop turns it into a `FailedException` outcome for that record only.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the payslip-mailer library.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Roster errors ─────────────────────────────────────────────────────
    /// The roster could not be parsed as tabular data.
    #[error("Roster '{path}' could not be parsed: {detail}")]
    RosterParse { path: PathBuf, detail: String },

    /// The roster parsed, but none of its headers identify the staff column.
    #[error("Roster '{path}' has no identifier column (looked for: {expected})")]
    MissingIdentifierColumn { path: PathBuf, expected: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// A page index beyond the document's page count was requested.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium refused to hand out a page that should exist.
    #[error("Page {page} of '{path}' could not be read: {detail}")]
    DocumentRead {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    // ── Transport errors ──────────────────────────────────────────────────
    /// No mail transport was supplied and none could be built from settings
    /// or the environment.
    #[error("Mail transport is not configured.\n{hint}")]
    TransportNotConfigured { hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The per-batch working directory could not be created.
    #[error("Failed to prepare working directory under '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library next to the\n\
binary, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::PageRecord::error`] and collected into the
/// batch report. The batch continues past every variant.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Rasterisation or character recognition failed.
    #[error("Page {page}: optical recognition failed: {detail}")]
    Ocr { page: usize, detail: String },

    /// The single-page artifact could not be created.
    #[error("Page {page}: could not write '{path}': {detail}")]
    DocumentWrite {
        page: usize,
        path: PathBuf,
        detail: String,
    },
}

impl PageError {
    /// 1-indexed page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Ocr { page, .. } | PageError::DocumentWrite { page, .. } => *page,
        }
    }
}

/// An attempt to hand a message to the mail transport blew up.
///
/// Distinct from a transport that *answered* with a rejection, which is
/// reported as [`crate::dispatch::SendOutcome::Rejected`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The message could not be assembled (bad address, unreadable attachment).
    #[error("Could not build message for {to}: {detail}")]
    Message { to: String, detail: String },

    /// The relay could not be reached or the session broke down.
    #[error("Mail relay error: {0}")]
    Connection(String),

    /// The attachment file could not be read.
    #[error("Could not read attachment '{path}': {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
