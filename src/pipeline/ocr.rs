//! Optical character recognition back-ends.
//!
//! [`OcrEngine`] is the seam: the extraction chain hands it a rasterised
//! page and gets text back. [`TesseractEngine`] is the production
//! implementation (leptess bindings to Tesseract 4/5).

use image::DynamicImage;
use leptess::LepTess;
use std::cell::RefCell;
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

/// Nominal PDF resolution; a page rendered at scale `s` has `72 * s` DPI.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Failures on the optical path. Always recoverable at batch level.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The page could not be turned into pixels.
    #[error("rasterisation failed: {0}")]
    Rasterise(String),

    /// The OCR engine could not be started (missing language data etc.).
    #[error("failed to initialise OCR engine: {0}")]
    Init(String),

    /// The engine ran but could not produce text.
    #[error("recognition failed: {0}")]
    Recognition(String),
}

/// Turns a page image into text.
pub trait OcrEngine {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Recognise all text in `image`.
    ///
    /// `scale` is the factor the page was rendered at, so engines that care
    /// about resolution can derive the effective DPI.
    fn recognize(&self, image: &DynamicImage, scale: f32) -> Result<String, OcrError>;
}

/// Tesseract via leptess.
///
/// The Tesseract handle is created on first use, so documents whose pages
/// all carry a text layer never load the language data. One handle is then
/// reused for every page of the batch.
pub struct TesseractEngine {
    language: String,
    datapath: Option<String>,
    api: RefCell<Option<LepTess>>,
}

impl TesseractEngine {
    /// `language` is a Tesseract language code such as `"eng"` or `"eng+fra"`.
    /// Language data is looked up in `TESSDATA_PREFIX` or the system default.
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            datapath: std::env::var("TESSDATA_PREFIX").ok().filter(|s| !s.is_empty()),
            api: RefCell::new(None),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage, scale: f32) -> Result<String, OcrError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(OcrError::Recognition(format!(
                "empty raster ({width}x{height})"
            )));
        }

        // leptess decodes from an encoded buffer; PNG keeps glyph edges intact.
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| OcrError::Recognition(format!("PNG encoding failed: {e}")))?;

        let mut slot = self.api.borrow_mut();
        if slot.is_none() {
            debug!("Initialising Tesseract (language '{}')", self.language);
            let api = LepTess::new(self.datapath.as_deref(), &self.language).map_err(|e| {
                OcrError::Init(format!(
                    "language '{}': {}. Is the Tesseract language data installed?",
                    self.language, e
                ))
            })?;
            *slot = Some(api);
        }
        let api = slot
            .as_mut()
            .ok_or_else(|| OcrError::Init("Tesseract handle missing".into()))?;

        api.set_image_from_mem(png.get_ref())
            .map_err(|e| OcrError::Recognition(format!("could not load raster: {e}")))?;
        api.set_source_resolution((PDF_POINTS_PER_INCH * scale).round() as i32);

        let text = api
            .get_utf8_text()
            .map_err(|e| OcrError::Recognition(e.to_string()))?;
        debug!(
            "Tesseract recognised {} chars from {}x{} raster",
            text.len(),
            width,
            height
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn zero_sized_raster_is_rejected_without_touching_tesseract() {
        let engine = TesseractEngine::new("eng");
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let err = engine.recognize(&img, 2.0).unwrap_err();
        assert!(matches!(err, OcrError::Recognition(_)));
        assert!(engine.api.borrow().is_none());
    }

    #[test]
    fn engine_is_lazy() {
        let engine = TesseractEngine::new("eng");
        assert_eq!(engine.name(), "tesseract");
        assert!(engine.api.borrow().is_none());
    }

    #[test]
    #[ignore = "requires Tesseract with English language data"]
    fn blank_page_yields_no_text() {
        let engine = TesseractEngine::new("eng");
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 255, 255])));
        let text = engine.recognize(&img, 2.0).unwrap();
        assert!(text.trim().is_empty());
    }

    #[test]
    fn error_messages_name_the_stage() {
        assert!(OcrError::Rasterise("boom".into()).to_string().contains("rasterisation"));
        assert!(OcrError::Init("eng".into()).to_string().contains("initialise"));
    }
}
