//! Page text extraction as an ordered chain of strategies.
//!
//! Each [`TextExtractor`] knows one way of getting text off a page. The
//! [`ExtractionChain`] tries them in priority order and stops at the first
//! one that yields at least `min_chars` characters. The last tier's answer
//! is accepted whatever its length.
//!
//! ```text
//! page ──▶ embedded text ──(< min_chars)──▶ rasterise + OCR
//!                │                                 │
//!                └──────────── PageRecord ◀────────┘
//! ```
//!
//! A tier that errors ends the chain for that page: the page is recorded
//! with [`ExtractionMethod::None`] and cannot be matched.

use crate::error::PageError;
use crate::output::{ExtractionMethod, PageRecord};
use crate::pipeline::ocr::{OcrEngine, OcrError};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse every whitespace run to one space and trim both ends.
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}

/// The view of a page the extractors need.
///
/// Implemented over pdfium pages in [`crate::pipeline::document`]; tests
/// implement it over canned text.
pub trait PageContent {
    /// 0-indexed page number.
    fn index(&self) -> usize;

    /// Concatenated text of the embedded text layer, or an empty string
    /// when the page has none.
    fn embedded_text(&self) -> String;

    /// Render the page at `scale` × its nominal size.
    fn rasterize(&self, scale: f32) -> Result<DynamicImage, OcrError>;
}

/// One way of getting text off a page.
pub trait TextExtractor {
    fn method(&self) -> ExtractionMethod;

    /// Raw (not yet normalised) page text.
    fn extract(&self, page: &dyn PageContent) -> Result<String, PageError>;
}

/// Reads the PDF's own text layer.
pub struct EmbeddedTextExtractor;

impl TextExtractor for EmbeddedTextExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::EmbeddedText
    }

    fn extract(&self, page: &dyn PageContent) -> Result<String, PageError> {
        Ok(page.embedded_text())
    }
}

/// Rasterises the page and runs OCR on the pixels.
pub struct OcrExtractor {
    engine: Box<dyn OcrEngine>,
    scale: f32,
}

impl OcrExtractor {
    pub fn new(engine: Box<dyn OcrEngine>, scale: f32) -> Self {
        Self { engine, scale }
    }
}

impl TextExtractor for OcrExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::OpticalRecognition
    }

    fn extract(&self, page: &dyn PageContent) -> Result<String, PageError> {
        let to_page_error = |e: OcrError| PageError::Ocr {
            page: page.index() + 1,
            detail: e.to_string(),
        };
        let image = page.rasterize(self.scale).map_err(to_page_error)?;
        debug!(
            "Page {}: rasterised at {}x → {}x{} px, running {}",
            page.index() + 1,
            self.scale,
            image.width(),
            image.height(),
            self.engine.name()
        );
        self.engine
            .recognize(&image, self.scale)
            .map_err(to_page_error)
    }
}

/// Extractors tried in priority order.
pub struct ExtractionChain {
    tiers: Vec<Box<dyn TextExtractor>>,
    min_chars: usize,
}

impl ExtractionChain {
    pub fn new(min_chars: usize) -> Self {
        Self {
            tiers: Vec::new(),
            min_chars,
        }
    }

    /// Append a lower-priority tier.
    pub fn with(mut self, tier: Box<dyn TextExtractor>) -> Self {
        self.tiers.push(tier);
        self
    }

    /// The standard chain: embedded text, then OCR when `ocr` is given.
    pub fn standard(min_chars: usize, ocr: Option<OcrExtractor>) -> Self {
        let chain = Self::new(min_chars).with(Box::new(EmbeddedTextExtractor));
        match ocr {
            Some(ocr) => chain.with(Box::new(ocr)),
            None => chain,
        }
    }

    /// Run the chain over one page.
    pub fn extract(&self, page: &dyn PageContent) -> PageRecord {
        let index = page.index();
        let last = self.tiers.len().saturating_sub(1);

        for (i, tier) in self.tiers.iter().enumerate() {
            let method = tier.method();
            match tier.extract(page) {
                Ok(raw) => {
                    let text = normalize_whitespace(&raw);
                    let chars = text.chars().count();
                    if chars >= self.min_chars || i == last {
                        debug!("Page {}: {} chars via {:?}", index + 1, chars, method);
                        return PageRecord {
                            index,
                            raw_text: text,
                            extraction_method: method,
                            error: None,
                        };
                    }
                    debug!(
                        "Page {}: only {} chars via {:?} (need {}), trying next tier",
                        index + 1,
                        chars,
                        method,
                        self.min_chars
                    );
                }
                Err(e) => {
                    warn!("{}", e);
                    return PageRecord::unreadable(index, e);
                }
            }
        }

        PageRecord {
            index,
            raw_text: String::new(),
            extraction_method: ExtractionMethod::None,
            error: None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::cell::Cell;
    use std::rc::Rc;

    /// A page with canned embedded text that counts rasterisations.
    pub(crate) struct FakePage {
        pub index: usize,
        pub text: String,
        pub rasterize_calls: Rc<Cell<usize>>,
        pub raster_fails: bool,
    }

    impl FakePage {
        pub(crate) fn new(index: usize, text: &str) -> Self {
            Self {
                index,
                text: text.to_string(),
                rasterize_calls: Rc::new(Cell::new(0)),
                raster_fails: false,
            }
        }
    }

    impl PageContent for FakePage {
        fn index(&self) -> usize {
            self.index
        }

        fn embedded_text(&self) -> String {
            self.text.clone()
        }

        fn rasterize(&self, _scale: f32) -> Result<DynamicImage, OcrError> {
            self.rasterize_calls.set(self.rasterize_calls.get() + 1);
            if self.raster_fails {
                return Err(OcrError::Rasterise("corrupt image stream".into()));
            }
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]))))
        }
    }

    /// OCR engine returning a fixed answer.
    pub(crate) struct FakeOcr(pub Result<String, String>);

    impl OcrEngine for FakeOcr {
        fn name(&self) -> &str {
            "fake"
        }

        fn recognize(&self, _image: &DynamicImage, _scale: f32) -> Result<String, OcrError> {
            self.0.clone().map_err(OcrError::Recognition)
        }
    }

    fn chain_with_ocr(answer: Result<&str, &str>) -> ExtractionChain {
        let answer = answer.map(str::to_string).map_err(str::to_string);
        ExtractionChain::standard(30, Some(OcrExtractor::new(Box::new(FakeOcr(answer)), 2.0)))
    }

    #[test]
    fn normalizes_whitespace_runs() {
        assert_eq!(normalize_whitespace("  IPPIS\n\tNumber :   12345 \r\n"), "IPPIS Number : 12345");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_whitespace("a \n\n b\t c");
        assert_eq!(normalize_whitespace(&once), once);
    }

    #[test]
    fn rich_text_layer_never_invokes_ocr() {
        let page = FakePage::new(
            0,
            "PAYSLIP  March 2024\nIPPIS Number: 12345\nName: Jane Doe\nNet Pay: 120,000",
        );
        let record = chain_with_ocr(Ok("should not be used")).extract(&page);

        assert_eq!(record.extraction_method, ExtractionMethod::EmbeddedText);
        assert!(record.raw_text.starts_with("PAYSLIP March 2024 IPPIS"));
        assert_eq!(page.rasterize_calls.get(), 0);
    }

    #[test]
    fn threshold_is_inclusive_at_thirty_chars() {
        let thirty = "x".repeat(30);
        let page = FakePage::new(0, &thirty);
        let record = chain_with_ocr(Ok("ocr text")).extract(&page);
        assert_eq!(record.extraction_method, ExtractionMethod::EmbeddedText);
        assert_eq!(page.rasterize_calls.get(), 0);

        let page = FakePage::new(1, &"x".repeat(29));
        let record = chain_with_ocr(Ok("ocr text")).extract(&page);
        assert_eq!(record.extraction_method, ExtractionMethod::OpticalRecognition);
        assert_eq!(page.rasterize_calls.get(), 1);
    }

    #[test]
    fn sparse_text_falls_back_to_ocr() {
        let page = FakePage::new(2, "   \n ");
        let record = chain_with_ocr(Ok("IPPIS  Number:\n12345")).extract(&page);

        assert_eq!(record.extraction_method, ExtractionMethod::OpticalRecognition);
        assert_eq!(record.raw_text, "IPPIS Number: 12345");
        assert!(record.error.is_none());
    }

    #[test]
    fn ocr_failure_marks_page_unreadable() {
        let page = FakePage::new(4, "");
        let record = chain_with_ocr(Err("tesseract crashed")).extract(&page);

        assert_eq!(record.extraction_method, ExtractionMethod::None);
        assert!(record.raw_text.is_empty());
        assert!(matches!(record.error, Some(PageError::Ocr { page: 5, .. })));
    }

    #[test]
    fn raster_failure_marks_page_unreadable() {
        let mut page = FakePage::new(0, "");
        page.raster_fails = true;
        let record = chain_with_ocr(Ok("unused")).extract(&page);

        assert_eq!(record.extraction_method, ExtractionMethod::None);
        match record.error {
            Some(PageError::Ocr { detail, .. }) => assert!(detail.contains("rasterisation")),
            other => panic!("expected OCR error, got {other:?}"),
        }
    }

    #[test]
    fn without_ocr_short_text_is_kept() {
        let page = FakePage::new(0, "IPPIS Number: 1");
        let record = ExtractionChain::standard(30, None).extract(&page);
        assert_eq!(record.extraction_method, ExtractionMethod::EmbeddedText);
        assert_eq!(record.raw_text, "IPPIS Number: 1");
        assert_eq!(page.rasterize_calls.get(), 0);
    }

    #[test]
    fn empty_chain_yields_no_text() {
        let page = FakePage::new(0, "anything");
        let record = ExtractionChain::new(30).extract(&page);
        assert_eq!(record.extraction_method, ExtractionMethod::None);
        assert!(record.error.is_none());
    }

    #[test]
    fn repeated_extraction_is_stable() {
        let page = FakePage::new(0, "IPPIS   Number:\n 12345   Jane  Doe  Ministry of Works");
        let chain = chain_with_ocr(Ok("unused"));
        let a = chain.extract(&page);
        let b = chain.extract(&page);
        assert_eq!(a.raw_text, b.raw_text);
        assert_eq!(a.extraction_method, b.extraction_method);
    }
}
