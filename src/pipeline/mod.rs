//! Pipeline stages that turn an uploaded document and roster into
//! per-recipient single-page PDFs.
//!
//! Each submodule implements exactly one step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ roster ──▶ matcher
//!   │                     │
//!   └──▶ document ──▶ extract (ocr) ──▶ scan ──▶ artifact
//!        (pdfium)     (text / pixels)   (loop)   (single pages)
//! ```
//!
//! 1. [`input`]    validate both uploads and delete them when the batch ends
//! 2. [`roster`]   read the spreadsheet into [`roster::RosterEntry`] rows
//! 3. [`matcher`]  compile one label+identifier pattern per roster entry
//! 4. [`document`] pdfium access; blocking, runs in `spawn_blocking`
//! 5. [`extract`]  embedded text first, OCR ([`ocr`]) when it is too thin
//! 6. [`scan`]     the per-page loop tying the above together
//! 7. [`artifact`] per-batch working directory and artifact naming

pub mod artifact;
pub mod document;
pub mod extract;
pub mod input;
pub mod matcher;
pub mod ocr;
pub mod roster;
pub mod scan;
