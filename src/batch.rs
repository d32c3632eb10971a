//! Batch entry points.
//!
//! [`process_batch`] runs one document and one roster end to end:
//!
//! 1. validate both uploads ([`SourceFiles`] owns them from here on)
//! 2. resolve the mail transport, so a misconfigured relay fails before any
//!    page is touched
//! 3. load the roster and compile the identifier patterns
//! 4. scan the document on a blocking thread, writing one artifact per match
//! 5. dispatch every match in page order
//! 6. remove the working directory and (optionally) the uploads
//!
//! Steps 1–4 can fail the whole batch. From step 5 on, failures are per
//! record and the caller always gets the complete [`BatchReport`].

use crate::config::{BatchConfig, UnmatchedPolicy};
use crate::dispatch::{self, MailTransport, SmtpMailer, SmtpSettings};
use crate::error::BatchError;
use crate::output::{BatchReport, BatchStats};
use crate::pipeline::artifact::ArtifactDir;
use crate::pipeline::input::SourceFiles;
use crate::pipeline::matcher::IdentifierMatcher;
use crate::pipeline::roster::{load_roster, RosterOptions};
use crate::pipeline::scan::{scan_document, ScanSettings};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Split `document` by the identifiers in `roster` and mail each page.
///
/// # Returns
/// `Ok(BatchReport)` once every matched record has a terminal status, even
/// if some sends failed (check `report.stats`).
///
/// # Errors
/// Returns `Err(BatchError)` only for fatal errors, before anything is sent:
/// - Either input missing, unreadable, or the document not a PDF
/// - Roster unparsable or without an identifier column
/// - Document corrupt or password-protected
/// - No mail transport configured
///
/// Working files are removed on every path, and the uploads too when
/// `config.remove_sources` is set.
pub async fn process_batch(
    document: impl AsRef<Path>,
    roster: impl AsRef<Path>,
    config: &BatchConfig,
) -> Result<BatchReport, BatchError> {
    let total_start = Instant::now();

    // ── Step 1: Resolve inputs ───────────────────────────────────────────
    let sources = SourceFiles::open(document, roster, config.remove_sources)?;
    info!(
        "Starting batch: {} with roster {}",
        sources.document().display(),
        sources.roster().display()
    );

    // ── Step 2: Mail transport ───────────────────────────────────────────
    let transport = resolve_transport(config)?;

    // ── Step 3: Roster and matcher ───────────────────────────────────────
    let roster_path = sources.roster().to_path_buf();
    let identifier_column = config.identifier_column.clone();
    let sheet = config.roster_sheet.clone();
    let entries = tokio::task::spawn_blocking(move || {
        let options = RosterOptions {
            identifier_column: identifier_column.as_deref(),
            sheet: sheet.as_deref(),
        };
        load_roster(&roster_path, &options)
    })
    .await
    .map_err(|e| BatchError::Internal(format!("Roster task panicked: {}", e)))??;

    if entries.is_empty() {
        warn!("Roster is empty; no page can match");
    }
    let roster_entries = entries.len();
    let matcher = IdentifierMatcher::new(&config.identifier_label, &entries, config.match_policy)?;

    // ── Step 4: Scan pages ───────────────────────────────────────────────
    let artifacts = ArtifactDir::create(config.scratch_dir.as_deref())?;
    let settings = ScanSettings {
        password: config.password.clone(),
        min_text_chars: config.min_text_chars,
        ocr_enabled: config.ocr_enabled,
        ocr_scale: config.ocr_scale,
        ocr_language: config.ocr_language.clone(),
        unmatched_policy: config.unmatched_policy,
    };
    let pdf_path = sources.document().to_path_buf();
    let progress = config.progress_callback.clone();

    let scan_start = Instant::now();
    let (scan, artifacts) = tokio::task::spawn_blocking(move || {
        scan_document(&pdf_path, &matcher, artifacts, &settings, progress.as_ref())
    })
    .await
    .map_err(|e| BatchError::Internal(format!("Scan task panicked: {}", e)))??;
    let scan_duration_ms = scan_start.elapsed().as_millis() as u64;

    // ── Step 5: Dispatch ─────────────────────────────────────────────────
    let mut results = scan.matches;
    let dispatch_start = Instant::now();
    dispatch::dispatch_all(&mut results, transport.as_ref(), config).await;
    let dispatch_duration_ms = dispatch_start.elapsed().as_millis() as u64;

    // ── Step 6: Cleanup ──────────────────────────────────────────────────
    artifacts.close();
    drop(sources);

    let mut stats = BatchStats {
        total_pages: scan.total_pages,
        roster_entries,
        embedded_text_pages: scan.embedded_text_pages,
        ocr_pages: scan.ocr_pages,
        matched_pages: results.len(),
        unmatched_pages: scan.unmatched.len(),
        artifact_failures: scan.artifact_failures,
        scan_duration_ms,
        dispatch_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        ..Default::default()
    };
    stats.count_outcomes(&results);

    info!(
        "Batch complete: {}/{} pages matched, {} sent, {} failed, {} invalid, {} errored, {}ms total",
        stats.matched_pages,
        stats.total_pages,
        stats.sent,
        stats.failed,
        stats.invalid_email,
        stats.failed_exception,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(&stats);
    }

    let unmatched_pages = match config.unmatched_policy {
        UnmatchedPolicy::Report => scan.unmatched,
        UnmatchedPolicy::Ignore | UnmatchedPolicy::Warn => Vec::new(),
    };

    Ok(BatchReport {
        results,
        unmatched_pages,
        page_errors: scan.page_errors,
        stats,
    })
}

/// Synchronous wrapper around [`process_batch`].
///
/// Creates a temporary tokio runtime. Do not call from within an existing
/// async runtime (use [`process_batch`] directly instead).
pub fn process_batch_sync(
    document: impl AsRef<Path>,
    roster: impl AsRef<Path>,
    config: &BatchConfig,
) -> Result<BatchReport, BatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BatchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_batch(document, roster, config))
}

/// Pick the mail transport for this batch.
///
/// Order: an explicit transport, explicit SMTP settings, then the `SMTP_*`
/// environment variables.
pub fn resolve_transport(config: &BatchConfig) -> Result<Arc<dyn MailTransport>, BatchError> {
    if let Some(ref transport) = config.transport {
        return Ok(Arc::clone(transport));
    }

    if let Some(ref settings) = config.smtp {
        return Ok(Arc::new(SmtpMailer::new(settings)?));
    }

    match SmtpSettings::from_env()? {
        Some(settings) => Ok(Arc::new(SmtpMailer::new(&settings)?)),
        None => Err(BatchError::TransportNotConfigured {
            hint: "Set SMTP_HOST and SMTP_FROM (plus SMTP_USERNAME / SMTP_PASSWORD if the relay \
                   requires authentication), or use --dry-run."
                .to_string(),
        }),
    }
}
