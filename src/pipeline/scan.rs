//! Page scan: extract → match → split, one page at a time.
//!
//! Pages are processed strictly in order on a single blocking thread. OCR is
//! the expensive step and is only reached for pages whose text layer is too
//! thin, so there is nothing to gain from running pages in parallel while
//! pdfium would have to be shared across threads.

use crate::config::UnmatchedPolicy;
use crate::error::{BatchError, PageError};
use crate::output::{DispatchStatus, ExtractionMethod, MatchResult};
use crate::pipeline::artifact::ArtifactDir;
use crate::pipeline::document;
use crate::pipeline::extract::{ExtractionChain, OcrExtractor, PageContent};
use crate::pipeline::matcher::IdentifierMatcher;
use crate::pipeline::ocr::TesseractEngine;
use crate::progress::{PageOutcome, ProgressCallback};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Settings the scan needs, detached from [`crate::config::BatchConfig`] so
/// they can move onto the blocking thread.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub password: Option<String>,
    pub min_text_chars: usize,
    pub ocr_enabled: bool,
    pub ocr_scale: f32,
    pub ocr_language: String,
    pub unmatched_policy: UnmatchedPolicy,
}

/// Everything the scan found.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub total_pages: usize,
    /// Matched pages with a written artifact, in page order.
    pub matches: Vec<MatchResult>,
    /// Every unmatched page (0-indexed), whatever the policy.
    pub unmatched: Vec<usize>,
    pub page_errors: Vec<PageError>,
    pub embedded_text_pages: usize,
    pub ocr_pages: usize,
    pub artifact_failures: usize,
}

/// Open the document and scan every page.
///
/// Blocking. Returns the artifact directory alongside the outcome so the
/// caller controls when artifacts are removed; on error the directory is
/// dropped here, which removes whatever was written so far.
pub fn scan_document(
    pdf_path: &Path,
    matcher: &IdentifierMatcher,
    mut artifacts: ArtifactDir,
    settings: &ScanSettings,
    progress: Option<&ProgressCallback>,
) -> Result<(ScanOutcome, ArtifactDir), BatchError> {
    let pdfium = document::bind_pdfium()?;
    let doc = document::open_document(&pdfium, pdf_path, settings.password.as_deref())?;
    let total = doc.pages().len() as usize;

    if let Some(cb) = progress {
        cb.on_batch_start(total, matcher.len());
    }

    let ocr = settings.ocr_enabled.then(|| {
        OcrExtractor::new(
            Box::new(TesseractEngine::new(settings.ocr_language.clone())),
            settings.ocr_scale,
        )
    });
    let chain = ExtractionChain::standard(settings.min_text_chars, ocr);

    let pages = (0..total).map(|i| document::page(&doc, pdf_path, i));
    let outcome = scan_pages(
        pages,
        total,
        &chain,
        matcher,
        &mut artifacts,
        |index, dest| document::write_single_page(&pdfium, &doc, index, dest),
        settings.unmatched_policy,
        progress,
    )?;

    Ok((outcome, artifacts))
}

/// The scan loop proper, independent of pdfium.
///
/// `write_artifact(page_index, dest)` must leave a single-page document at
/// `dest` or return the reason it could not.
#[allow(clippy::too_many_arguments)]
pub fn scan_pages<P, I, W>(
    pages: I,
    total: usize,
    chain: &ExtractionChain,
    matcher: &IdentifierMatcher,
    artifacts: &mut ArtifactDir,
    mut write_artifact: W,
    unmatched_policy: UnmatchedPolicy,
    progress: Option<&ProgressCallback>,
) -> Result<ScanOutcome, BatchError>
where
    P: PageContent,
    I: IntoIterator<Item = Result<P, BatchError>>,
    W: FnMut(usize, &Path) -> Result<(), PageError>,
{
    let mut outcome = ScanOutcome {
        total_pages: total,
        ..Default::default()
    };

    for page in pages {
        let page = page?;
        let index = page.index();
        let record = chain.extract(&page);

        match record.extraction_method {
            ExtractionMethod::EmbeddedText => outcome.embedded_text_pages += 1,
            ExtractionMethod::OpticalRecognition => outcome.ocr_pages += 1,
            ExtractionMethod::None => {}
        }
        if let Some(ref e) = record.error {
            outcome.page_errors.push(e.clone());
        }

        let page_outcome = match matcher.find(&record.raw_text) {
            Some(entry) => {
                let dest: PathBuf = artifacts.path_for(entry, index);
                match write_artifact(index, &dest) {
                    Ok(()) => {
                        debug!("Page {} → {} ({})", index + 1, entry.identifier, entry.name);
                        outcome.matches.push(MatchResult {
                            page_index: index,
                            identifier: entry.identifier.clone(),
                            name: entry.name.clone(),
                            email: entry.email.clone(),
                            artifact_path: dest,
                            extraction_method: record.extraction_method,
                            dispatch_status: DispatchStatus::Pending,
                            sent_at: None,
                            detail: None,
                        });
                        PageOutcome::Matched(&entry.identifier)
                    }
                    Err(e) => {
                        warn!("{}", e);
                        outcome.artifact_failures += 1;
                        outcome.page_errors.push(e);
                        PageOutcome::ArtifactFailed
                    }
                }
            }
            None => {
                match unmatched_policy {
                    UnmatchedPolicy::Ignore => debug!("Page {}: no roster match", index + 1),
                    UnmatchedPolicy::Warn | UnmatchedPolicy::Report => {
                        warn!("Page {}: no roster match", index + 1)
                    }
                }
                outcome.unmatched.push(index);
                PageOutcome::Unmatched
            }
        };

        if let Some(cb) = progress {
            cb.on_page_scanned(index + 1, total, &record, page_outcome);
        }
    }

    info!(
        "Scanned {} pages: {} matched, {} unmatched, {} via OCR",
        total,
        outcome.matches.len(),
        outcome.unmatched.len(),
        outcome.ocr_pages
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchPolicy;
    use crate::pipeline::extract::tests::{FakeOcr, FakePage};
    use crate::pipeline::roster::RosterEntry;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry {
                identifier: "12345".into(),
                name: "Jane Doe".into(),
                email: "jane@x.com".into(),
            },
            RosterEntry {
                identifier: "67890".into(),
                name: "John Roe".into(),
                email: "john@x.com".into(),
            },
        ]
    }

    fn chain(ocr: Result<&str, &str>) -> ExtractionChain {
        let ocr = ocr.map(str::to_string).map_err(str::to_string);
        ExtractionChain::standard(30, Some(OcrExtractor::new(Box::new(FakeOcr(ocr)), 2.0)))
    }

    fn slip(id: &str) -> String {
        format!("FEDERAL PAYSLIP  March 2024  IPPIS Number: {id}  Net Pay 100,000")
    }

    fn write_stub(_index: usize, dest: &Path) -> Result<(), PageError> {
        std::fs::write(dest, b"%PDF-1.7 single page").map_err(|e| PageError::DocumentWrite {
            page: 0,
            path: dest.to_path_buf(),
            detail: e.to_string(),
        })
    }

    fn run(
        pages: Vec<FakePage>,
        chain: &ExtractionChain,
        artifacts: &mut ArtifactDir,
    ) -> ScanOutcome {
        let matcher = IdentifierMatcher::new("IPPIS Number", &roster(), MatchPolicy::FirstMatch).unwrap();
        let total = pages.len();
        scan_pages(
            pages.into_iter().map(Ok),
            total,
            chain,
            &matcher,
            artifacts,
            write_stub,
            UnmatchedPolicy::Report,
            None,
        )
        .unwrap()
    }

    #[test]
    fn jane_doe_on_page_three() {
        let scratch = TempDir::new().unwrap();
        let mut artifacts = ArtifactDir::create(Some(scratch.path())).unwrap();
        let pages = vec![
            FakePage::new(0, &slip("00000")),
            FakePage::new(1, &slip("67890")),
            FakePage::new(2, "cover sheet with nothing useful on it at all"),
            FakePage::new(3, &slip("12345")),
        ];
        let outcome = run(pages, &chain(Ok("")), &mut artifacts);

        let jane = outcome.matches.iter().find(|m| m.identifier == "12345").unwrap();
        assert_eq!(jane.page_index, 3);
        assert_eq!(jane.email, "jane@x.com");
        assert_eq!(jane.dispatch_status, DispatchStatus::Pending);
        assert!(jane.artifact_path.exists());
        assert!(jane.artifact_path.starts_with(artifacts.path()));

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.unmatched, vec![0, 2]);
    }

    #[test]
    fn at_most_one_result_per_page() {
        let scratch = TempDir::new().unwrap();
        let mut artifacts = ArtifactDir::create(Some(scratch.path())).unwrap();
        let both = format!("{} {}", slip("67890"), slip("12345"));
        let pages = vec![
            FakePage::new(0, &both),
            FakePage::new(1, &slip("12345")),
            FakePage::new(2, &slip("12345")),
        ];
        let outcome = run(pages, &chain(Ok("")), &mut artifacts);

        assert!(outcome.matches.len() <= 3);
        let indices: HashSet<usize> = outcome.matches.iter().map(|m| m.page_index).collect();
        assert_eq!(indices.len(), outcome.matches.len());
        // Roster order decides the shared page.
        assert_eq!(outcome.matches[0].identifier, "12345");
        // Same person on two pages: distinct artifacts.
        assert_ne!(outcome.matches[1].artifact_path, outcome.matches[2].artifact_path);
    }

    #[test]
    fn ocr_failure_skips_page_and_continues() {
        let scratch = TempDir::new().unwrap();
        let mut artifacts = ArtifactDir::create(Some(scratch.path())).unwrap();
        let pages = vec![
            FakePage::new(0, ""),
            FakePage::new(1, &slip("67890")),
        ];
        let outcome = run(pages, &chain(Err("unreadable scan")), &mut artifacts);

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].page_index, 1);
        assert_eq!(outcome.unmatched, vec![0]);
        assert!(matches!(outcome.page_errors[0], PageError::Ocr { page: 1, .. }));
    }

    #[test]
    fn scanned_pages_match_through_ocr() {
        let scratch = TempDir::new().unwrap();
        let mut artifacts = ArtifactDir::create(Some(scratch.path())).unwrap();
        let page = FakePage::new(0, "");
        let calls = page.rasterize_calls.clone();
        let outcome = run(vec![page], &chain(Ok("IPPIS Number 67890")), &mut artifacts);

        assert_eq!(calls.get(), 1);
        assert_eq!(outcome.ocr_pages, 1);
        assert_eq!(outcome.matches[0].extraction_method, ExtractionMethod::OpticalRecognition);
    }

    #[test]
    fn artifact_failure_drops_the_record() {
        let scratch = TempDir::new().unwrap();
        let mut artifacts = ArtifactDir::create(Some(scratch.path())).unwrap();
        let matcher = IdentifierMatcher::new("IPPIS Number", &roster(), MatchPolicy::FirstMatch).unwrap();
        let pages = vec![FakePage::new(0, &slip("12345")), FakePage::new(1, &slip("67890"))];

        let outcome = scan_pages(
            pages.into_iter().map(Ok),
            2,
            &chain(Ok("")),
            &matcher,
            &mut artifacts,
            |index, dest| {
                if index == 0 {
                    Err(PageError::DocumentWrite {
                        page: 1,
                        path: dest.to_path_buf(),
                        detail: "disk full".into(),
                    })
                } else {
                    write_stub(index, dest)
                }
            },
            UnmatchedPolicy::Report,
            None,
        )
        .unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].identifier, "67890");
        assert_eq!(outcome.artifact_failures, 1);
        assert!(matches!(outcome.page_errors[0], PageError::DocumentWrite { .. }));
    }

    #[test]
    fn unreadable_page_aborts_the_scan() {
        let scratch = TempDir::new().unwrap();
        let mut artifacts = ArtifactDir::create(Some(scratch.path())).unwrap();
        let matcher = IdentifierMatcher::new("IPPIS Number", &roster(), MatchPolicy::FirstMatch).unwrap();
        let pages: Vec<Result<FakePage, BatchError>> = vec![
            Ok(FakePage::new(0, &slip("12345"))),
            Err(BatchError::PageOutOfRange { page: 2, total: 1 }),
        ];

        let err = scan_pages(
            pages,
            2,
            &chain(Ok("")),
            &matcher,
            &mut artifacts,
            write_stub,
            UnmatchedPolicy::Report,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::PageOutOfRange { .. }));
    }
}
