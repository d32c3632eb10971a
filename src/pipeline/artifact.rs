//! Per-batch working directory and artifact naming.
//!
//! Every batch gets a fresh `batch-<UTC timestamp>-<random>` directory under
//! the scratch root, so concurrent or repeated batches never share file
//! names. The directory is a [`TempDir`]: it disappears on drop, which covers
//! normal completion, fatal errors and panics alike.

use crate::error::BatchError;
use crate::pipeline::roster::RosterEntry;
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Replace every non-alphanumeric character with `_`.
pub fn sanitize_component(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Working directory that owns every artifact of one batch.
#[derive(Debug)]
pub struct ArtifactDir {
    dir: TempDir,
    taken: HashSet<PathBuf>,
}

impl ArtifactDir {
    /// Create the batch directory under `scratch` (or the system temp dir).
    pub fn create(scratch: Option<&Path>) -> Result<Self, BatchError> {
        let root = scratch
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&root).map_err(|source| BatchError::Scratch {
            path: root.clone(),
            source,
        })?;

        let prefix = format!("batch-{}-", Utc::now().format("%Y%m%dT%H%M%S%3fZ"));
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&root)
            .map_err(|source| BatchError::Scratch {
                path: root.clone(),
                source,
            })?;

        debug!("Batch working directory: {}", dir.path().display());
        Ok(Self {
            dir,
            taken: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Reserve the artifact path for `entry` found on page `page_index`.
    ///
    /// `{identifier}_{name}.pdf`, sanitised; when the same entry claims a
    /// second page the 1-based page number is appended.
    pub fn path_for(&mut self, entry: &RosterEntry, page_index: usize) -> PathBuf {
        let stem = format!(
            "{}_{}",
            sanitize_component(&entry.identifier),
            sanitize_component(&entry.name)
        );
        let mut path = self.dir.path().join(format!("{stem}.pdf"));
        if self.taken.contains(&path) {
            path = self
                .dir
                .path()
                .join(format!("{stem}_p{}.pdf", page_index + 1));
        }
        self.taken.insert(path.clone());
        path
    }

    /// Delete the directory and everything in it, logging failures.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed working directory {}", path.display()),
            Err(e) => warn!("Could not remove working directory {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str) -> RosterEntry {
        RosterEntry {
            identifier: id.into(),
            name: name.into(),
            email: "x@x.com".into(),
        }
    }

    #[test]
    fn sanitizes_to_filesystem_safe_names() {
        assert_eq!(sanitize_component("Jane O'Doe-Smith"), "Jane_O_Doe_Smith");
        assert_eq!(sanitize_component("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_component("12345"), "12345");
    }

    #[test]
    fn artifact_name_combines_identifier_and_name() {
        let scratch = TempDir::new().unwrap();
        let mut dir = ArtifactDir::create(Some(scratch.path())).unwrap();
        let p = dir.path_for(&entry("12345", "Jane Doe"), 3);
        assert_eq!(p.file_name().unwrap(), "12345_Jane_Doe.pdf");
        assert_eq!(p.parent().unwrap(), dir.path());
    }

    #[test]
    fn second_page_for_same_entry_gets_page_suffix() {
        let scratch = TempDir::new().unwrap();
        let mut dir = ArtifactDir::create(Some(scratch.path())).unwrap();
        let a = dir.path_for(&entry("1", "A"), 0);
        let b = dir.path_for(&entry("1", "A"), 4);
        assert_ne!(a, b);
        assert_eq!(b.file_name().unwrap(), "1_A_p5.pdf");
    }

    #[test]
    fn batches_get_distinct_directories() {
        let scratch = TempDir::new().unwrap();
        let a = ArtifactDir::create(Some(scratch.path())).unwrap();
        let b = ArtifactDir::create(Some(scratch.path())).unwrap();
        assert_ne!(a.path(), b.path());
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("batch-"), "got {name}");
    }

    #[test]
    fn close_and_drop_remove_every_artifact() {
        let scratch = TempDir::new().unwrap();

        let mut dir = ArtifactDir::create(Some(scratch.path())).unwrap();
        let artifact = dir.path_for(&entry("1", "A"), 0);
        std::fs::write(&artifact, b"%PDF-1.7").unwrap();
        let root = dir.path().to_path_buf();
        dir.close();
        assert!(!artifact.exists());
        assert!(!root.exists());

        let mut dir = ArtifactDir::create(Some(scratch.path())).unwrap();
        let artifact = dir.path_for(&entry("2", "B"), 0);
        std::fs::write(&artifact, b"%PDF-1.7").unwrap();
        drop(dir);
        assert!(!artifact.exists());
    }

    #[test]
    fn creates_missing_scratch_root() {
        let scratch = TempDir::new().unwrap();
        let nested = scratch.path().join("uploads/payslips");
        let dir = ArtifactDir::create(Some(&nested)).unwrap();
        assert!(dir.path().starts_with(&nested));
    }
}
