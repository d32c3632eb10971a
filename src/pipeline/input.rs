//! Input resolution: validate the uploaded files and own their lifetime.
//!
//! The document and roster only live for one batch. [`SourceFiles`] checks
//! both up front (existence, read permission, `%PDF` magic) so callers get a
//! meaningful error instead of a pdfium crash, and deletes them when dropped
//! if the batch was configured to consume its inputs. Dropping happens on
//! every exit path, including fatal errors.

use crate::error::BatchError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The two files that make up a batch.
#[derive(Debug)]
pub struct SourceFiles {
    document: PathBuf,
    roster: PathBuf,
    remove_on_drop: bool,
}

impl SourceFiles {
    /// Validate both inputs.
    ///
    /// When `remove_on_drop` is set the files are deleted as soon as the
    /// returned value goes out of scope, whatever the batch outcome.
    pub fn open(
        document: impl AsRef<Path>,
        roster: impl AsRef<Path>,
        remove_on_drop: bool,
    ) -> Result<Self, BatchError> {
        let document = document.as_ref().to_path_buf();
        let roster = roster.as_ref().to_path_buf();

        // Armed before validation so a rejected upload is cleaned up too.
        let sources = Self {
            document,
            roster,
            remove_on_drop,
        };
        check_pdf(&sources.document)?;
        check_readable(&sources.roster)?;

        debug!(
            "Resolved inputs: document={}, roster={}",
            sources.document.display(),
            sources.roster.display()
        );
        Ok(sources)
    }

    pub fn document(&self) -> &Path {
        &self.document
    }

    pub fn roster(&self) -> &Path {
        &self.roster
    }
}

impl Drop for SourceFiles {
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        for path in [&self.document, &self.roster] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed source file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove source file {}: {}", path.display(), e),
            }
        }
    }
}

/// Validate that `path` exists, is readable and starts with the PDF magic.
fn check_pdf(path: &Path) -> Result<(), BatchError> {
    let mut file = open(path)?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(BatchError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn check_readable(path: &Path) -> Result<(), BatchError> {
    open(path).map(|_| ())
}

fn open(path: &Path) -> Result<std::fs::File, BatchError> {
    if !path.exists() {
        return Err(BatchError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => BatchError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => BatchError::FileNotFound {
            path: path.to_path_buf(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[test]
    fn accepts_pdf_and_roster() {
        let dir = TempDir::new().unwrap();
        let pdf = write(&dir, "slips.pdf", b"%PDF-1.4\n");
        let csv = write(&dir, "staff.csv", b"IPPIS Number,Name,Email\n");

        let sources = SourceFiles::open(&pdf, &csv, false).unwrap();
        assert_eq!(sources.document(), pdf);
        assert_eq!(sources.roster(), csv);
        drop(sources);
        assert!(pdf.exists() && csv.exists());
    }

    #[test]
    fn rejects_non_pdf() {
        let dir = TempDir::new().unwrap();
        let fake = write(&dir, "slips.pdf", b"PK\x03\x04zip");
        let csv = write(&dir, "staff.csv", b"id\n");

        let err = SourceFiles::open(&fake, &csv, false).unwrap_err();
        assert!(matches!(err, BatchError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[test]
    fn missing_roster_is_file_not_found() {
        let dir = TempDir::new().unwrap();
        let pdf = write(&dir, "slips.pdf", b"%PDF-1.7");

        let err = SourceFiles::open(&pdf, dir.path().join("nope.xlsx"), false).unwrap_err();
        assert!(matches!(err, BatchError::FileNotFound { .. }));
    }

    #[test]
    fn removes_sources_on_drop_when_armed() {
        let dir = TempDir::new().unwrap();
        let pdf = write(&dir, "slips.pdf", b"%PDF-1.4");
        let csv = write(&dir, "staff.csv", b"id\n1\n");

        let sources = SourceFiles::open(&pdf, &csv, true).unwrap();
        assert!(pdf.exists());
        drop(sources);
        assert!(!pdf.exists());
        assert!(!csv.exists());
    }

    #[test]
    fn rejected_upload_is_still_removed() {
        let dir = TempDir::new().unwrap();
        let fake = write(&dir, "slips.pdf", b"GIF89a");
        let csv = write(&dir, "staff.csv", b"id\n");

        assert!(SourceFiles::open(&fake, &csv, true).is_err());
        assert!(!fake.exists());
        assert!(!csv.exists());
    }
}
