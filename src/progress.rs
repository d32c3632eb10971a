//! Progress-callback trait for batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the batch scans pages and dispatches records. The host decides what to
//! do with them: a terminal progress bar, a WebSocket push, a log line.
//!
//! Page events are fired from the blocking scan thread, dispatch events from
//! the async task, so implementations must be `Send + Sync`.
//!
//! # Example
//!
//! ```rust
//! use payslip_mailer::{BatchConfig, BatchProgressCallback, MatchResult};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     dispatched: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_record_dispatched(&self, position: usize, total: usize, record: &MatchResult) {
//!         self.dispatched.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{}: {} -> {}", position, total, record.email, record.dispatch_status);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { dispatched: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchStats, MatchResult, PageRecord};
use std::sync::Arc;

/// What became of one scanned page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome<'a> {
    /// The page matched the roster entry with this identifier.
    Matched(&'a str),
    /// No roster entry matched.
    Unmatched,
    /// The page matched but no artifact could be written for it.
    ArtifactFailed,
}

/// Called by the batch pipeline as it works through pages and records.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once the document is open and its page count is known.
    fn on_batch_start(&self, total_pages: usize, roster_entries: usize) {
        let _ = (total_pages, roster_entries);
    }

    /// Called after each page has been read, matched and (if matched) split.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: total pages in the document
    /// * `record`     : recovered text and extraction method
    /// * `outcome`    : match result for the page
    fn on_page_scanned(
        &self,
        page_num: usize,
        total_pages: usize,
        record: &PageRecord,
        outcome: PageOutcome<'_>,
    ) {
        let _ = (page_num, total_pages, record, outcome);
    }

    /// Called once before the first record is dispatched.
    fn on_dispatch_start(&self, total_records: usize) {
        let _ = total_records;
    }

    /// Called after each record reaches a terminal status.
    ///
    /// # Arguments
    /// * `position`: 1-indexed position in dispatch order
    /// * `total`   : number of records being dispatched
    fn on_record_dispatched(&self, position: usize, total: usize, record: &MatchResult) {
        let _ = (position, total, record);
    }

    /// Called once after cleanup, with the final statistics.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
