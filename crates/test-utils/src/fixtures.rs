//! Scratch directories for tests that touch the filesystem.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Temporary directory laid out like a tiler run.
///
/// Removed when dropped.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where raw pyramid levels go.
    pub fn raw_dir(&self) -> PathBuf {
        self.dir.path().join("raw")
    }

    /// Where image tiles go.
    pub fn image_dir(&self) -> PathBuf {
        self.dir.path().join("images")
    }

    /// Where a mesh input group goes.
    pub fn mesh_dir(&self) -> PathBuf {
        self.dir.path().join("mesh.zarr")
    }
}

impl Default for ScratchDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Count regular files below `root`.
pub fn count_files(root: &Path) -> usize {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}
