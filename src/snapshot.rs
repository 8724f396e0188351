//! Pool-side file service for the worker runtime.
//!
//! The remote context typically has no filesystem, so snapshot assertions
//! round-trip their reads and writes through the pool. Paths resolve
//! against the project root; reads of missing files yield `None` (a new
//! snapshot is about to be written), writes create parent directories.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::error::Result;

// ============================================================================
// SnapshotFiles
// ============================================================================

/// Filesystem service backing the worker's `readFile`/`writeFile` RPC.
#[derive(Debug, Clone)]
pub struct SnapshotFiles {
    root: PathBuf,
}

impl SnapshotFiles {
    /// Creates a service rooted at the project root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a worker-supplied path against the root.
    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }

    /// Reads a file; `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] for failures other than absence.
    pub async fn read(&self, path: &str) -> Result<Option<String>> {
        let resolved = self.resolve(path);
        match fs::read_to_string(&resolved).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] on filesystem failures.
    pub async fn write(&self, path: &str, content: &str) -> Result<()> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&resolved, content).await?;
        debug!(path = %resolved.display(), bytes = content.len(), "Snapshot written");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = SnapshotFiles::new(dir.path());

        let content = files.read("__snapshots__/a.snap").await.expect("read");
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = SnapshotFiles::new(dir.path());

        files
            .write("__snapshots__/a.snap", "exports[`adds 1`] = `2`;\n")
            .await
            .expect("write");

        let content = files
            .read("__snapshots__/a.snap")
            .await
            .expect("read")
            .expect("present");
        assert!(content.contains("adds 1"));
    }

    #[tokio::test]
    async fn test_absolute_path_bypasses_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let other = tempfile::tempdir().expect("tempdir");
        let files = SnapshotFiles::new(dir.path());

        let absolute = other.path().join("abs.snap");
        files
            .write(&absolute.display().to_string(), "x")
            .await
            .expect("write");
        assert!(absolute.is_file());
    }
}
