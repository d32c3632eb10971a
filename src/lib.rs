//! # payslip-mailer
//!
//! Split a bulk payslip PDF into one single-page document per employee and
//! e-mail each page to its owner.
//!
//! ## Why this crate?
//!
//! Payroll systems usually export a month's payslips as one long PDF, one
//! employee per page, with a staff identifier printed on every page. This
//! crate finds that identifier on each page, looks it up in the staff roster,
//! cuts the page out into its own PDF and mails it to the address on the
//! roster. Scanned batches without a text layer are read with OCR.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF + roster
//!  │
//!  ├─ 1. Input     validate both uploads, own their lifetime
//!  ├─ 2. Roster    spreadsheet / CSV → ordered entries
//!  ├─ 3. Extract   embedded text, OCR when it is too thin (spawn_blocking)
//!  ├─ 4. Match     "IPPIS Number: <id>" pattern per roster entry
//!  ├─ 5. Split     one single-page PDF per match
//!  ├─ 6. Dispatch  sequential, paced sends via the mail transport
//!  └─ 7. Cleanup   working directory and uploads removed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use payslip_mailer::{process_batch, BatchConfig, DryRunTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Without a transport, SMTP settings are read from SMTP_HOST / SMTP_FROM / …
//!     let config = BatchConfig::builder()
//!         .transport(Arc::new(DryRunTransport::new()))
//!         .remove_sources(false)
//!         .build()?;
//!     let report = process_batch("payslips.pdf", "staff.xlsx", &config).await?;
//!     for row in report.summaries() {
//!         println!("{} {} {}", row.staff_id, row.email, row.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `payslip-mailer` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! payslip-mailer = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! A pdfium shared library (`PDFIUM_LIB_PATH`, the working directory, or the
//! system library path) and, for the OCR fallback, Tesseract with the
//! configured language data (`TESSDATA_PREFIX`).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{process_batch, process_batch_sync};
pub use config::{BatchConfig, BatchConfigBuilder, MatchPolicy, UnmatchedPolicy};
pub use dispatch::{
    DryRunTransport, JsonlStatusLog, MailTransport, OutgoingMail, SendOutcome, SmtpMailer,
    SmtpSecurity, SmtpSettings, StatusRecord, StatusSink,
};
pub use error::{BatchError, PageError, TransportError};
pub use output::{
    BatchReport, BatchStats, DispatchStatus, DispatchSummary, ExtractionMethod, MatchResult,
    PageRecord,
};
pub use pipeline::roster::RosterEntry;
pub use progress::{BatchProgressCallback, NoopProgressCallback, PageOutcome, ProgressCallback};
