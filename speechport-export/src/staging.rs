//! Private staging area for one export run
//!
//! The directory is created next to the destination so publishing is a
//! same-filesystem rename. It is removed when the handle drops unless
//! [`StagingArea::retain`] was called.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

/// Prefix of staging directory names
pub const STAGING_PREFIX: &str = ".speechport-staging-";

#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh staging directory under `root`, creating `root` if needed
    pub fn new_in<P: AsRef<Path>>(root: P) -> std::io::Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)?;
        debug!("Staging in {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Keep the directory on disk and return its path
    pub fn retain(self) -> PathBuf {
        self.dir.keep()
    }
}
