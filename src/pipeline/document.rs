//! pdfium access: open the batch document, read and render pages, and copy
//! single pages out into standalone PDFs.
//!
//! ## Why blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is not safe to drive from async contexts. Everything in this
//! module is synchronous and is called from the batch's `spawn_blocking`
//! task.

use crate::error::{BatchError, PageError};
use crate::pipeline::extract::PageContent;
use crate::pipeline::ocr::OcrError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Bind to a pdfium shared library.
///
/// Lookup order: `PDFIUM_LIB_PATH`, the current directory, then the system
/// library search path.
pub fn bind_pdfium() -> Result<Pdfium, BatchError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path)
            .map_err(|e| BatchError::PdfiumBindingFailed(format!("{path}: {e:?}")))?,
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| BatchError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

/// Open the batch document, classifying load failures.
pub fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, BatchError> {
    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                BatchError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                BatchError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            BatchError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    info!("PDF loaded: {} pages", document.pages().len());
    Ok(document)
}

/// Fetch page `index` (0-based).
pub fn page<'a>(
    document: &PdfDocument<'a>,
    pdf_path: &Path,
    index: usize,
) -> Result<PdfiumPage<'a>, BatchError> {
    let total = document.pages().len() as usize;
    if index >= total {
        return Err(BatchError::PageOutOfRange {
            page: index + 1,
            total,
        });
    }
    let page = document
        .pages()
        .get(index as PdfPageIndex)
        .map_err(|e| BatchError::DocumentRead {
            path: pdf_path.to_path_buf(),
            page: index + 1,
            detail: format!("{:?}", e),
        })?;
    Ok(PdfiumPage { index, page })
}

/// A pdfium page seen through the [`PageContent`] interface.
pub struct PdfiumPage<'a> {
    index: usize,
    page: PdfPage<'a>,
}

impl PageContent for PdfiumPage<'_> {
    fn index(&self) -> usize {
        self.index
    }

    fn embedded_text(&self) -> String {
        match self.page.text() {
            Ok(text) => text.all(),
            Err(e) => {
                // Scanned pages commonly have no text page at all.
                debug!("Page {}: no text layer ({:?})", self.index + 1, e);
                String::new()
            }
        }
    }

    fn rasterize(&self, scale: f32) -> Result<DynamicImage, OcrError> {
        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = self
            .page
            .render_with_config(&render_config)
            .map_err(|e| OcrError::Rasterise(format!("{:?}", e)))?;
        Ok(bitmap.as_image())
    }
}

/// Copy page `index` of `source` into a new single-page PDF at `dest`.
///
/// The copy is structural (objects are imported, not referenced), so the
/// artifact opens on its own after the source is deleted.
pub fn write_single_page(
    pdfium: &Pdfium,
    source: &PdfDocument<'_>,
    index: usize,
    dest: &Path,
) -> Result<(), PageError> {
    let write_error = |detail: String| PageError::DocumentWrite {
        page: index + 1,
        path: dest.to_path_buf(),
        detail,
    };

    let mut artifact = pdfium
        .create_new_pdf()
        .map_err(|e| write_error(format!("create: {:?}", e)))?;
    artifact
        .pages_mut()
        .copy_page_from_document(source, index as PdfPageIndex, 0)
        .map_err(|e| write_error(format!("copy: {:?}", e)))?;
    artifact
        .save_to_file(dest)
        .map_err(|e| write_error(format!("save: {:?}", e)))?;

    debug!("Page {} → {}", index + 1, dest.display());
    Ok(())
}
