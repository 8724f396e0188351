//! Bundler adapter.
//!
//! Turns one test file plus its relative imports into a single
//! self-executing script with an accompanying V3 sourcemap. Test-authoring
//! imports (`describe/it/expect/…`) are redirected to the worker runtime's
//! pre-registered global rather than bundled, so the remote runner's own
//! semantics govern execution. Externals and bare specifiers stay as real
//! `require` calls for the host to satisfy.
//!
//! The transform is deliberately line-preserving: every module body line
//! lands on its own output line, which keeps the sourcemap a cheap
//! line-level table.

// ============================================================================
// Modules
// ============================================================================

mod emit;
mod graph;
mod resolve;

pub use emit::RUNNER_MODULE_KEY;

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};

use graph::ModuleGraph;

// ============================================================================
// BundleOptions
// ============================================================================

/// Bundler configuration.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Project root; module keys and sourcemap sources are kept relative
    /// to it when possible.
    pub project_root: PathBuf,

    /// Specifiers that must remain real `require` calls (host built-ins).
    pub externals: Vec<String>,

    /// Test-authoring specifiers redirected to the worker global.
    pub runner_specifiers: Vec<String>,

    /// Whole-word identifier substitutions applied to module bodies.
    pub defines: FxHashMap<String, String>,

    /// Specifier aliases applied before resolution.
    pub aliases: FxHashMap<String, String>,

    /// Extra code prepended inside the wrapper (before any module runs).
    pub banner: Option<String>,
}

impl BundleOptions {
    /// Creates options rooted at `project_root` with default redirects.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            externals: Vec::new(),
            runner_specifiers: vec!["vitest".to_string()],
            defines: FxHashMap::default(),
            aliases: FxHashMap::default(),
            banner: None,
        }
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// One bundled file: self-executing code plus its sourcemap JSON.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// The self-executing script.
    pub code: String,

    /// V3 sourcemap JSON mapping bundled lines to original sources.
    pub sourcemap: String,
}

// ============================================================================
// Entry Point
// ============================================================================

/// Bundles `entry` and everything it reaches through relative imports.
///
/// # Errors
///
/// Returns [`Error::Bundle`] scoped to `entry` for unreadable files,
/// unresolvable imports, and unsupported syntax. Callers report this as
/// one synthetic failing test; it never aborts the whole run.
pub async fn bundle_file(entry: &Path, options: &BundleOptions) -> Result<Bundle> {
    let entry = absolutize(entry, &options.project_root);

    let graph = ModuleGraph::load(&entry, options)
        .await
        .map_err(|e| rescope(e, &entry))?;

    debug!(
        entry = %entry.display(),
        modules = graph.len(),
        "Bundling test file"
    );

    emit::emit(&graph, &entry, options).map_err(|e| rescope(e, &entry))
}

/// Resolves a possibly relative entry path against the project root.
fn absolutize(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Re-scopes inner errors onto the entry file for file-scoped reporting.
fn rescope(error: Error, entry: &Path) -> Error {
    match error {
        e @ Error::Bundle { .. } => e,
        other => Error::bundle(entry, other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).expect("write fixture");
        path
    }

    #[tokio::test]
    async fn test_bundle_single_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let entry = write(
            dir.path(),
            "basic.test.js",
            "import { it, expect } from 'vitest';\nit('adds', () => expect(1 + 1).toBe(2));\n",
        );

        let options = BundleOptions::new(dir.path());
        let bundle = bundle_file(&entry, &options).await.expect("bundle");

        assert!(bundle.code.contains("globalThis.__CDP_POOL_API__"));
        assert!(bundle.code.contains("it('adds'"));
        assert!(!bundle.code.contains("from 'vitest'"));
        assert!(bundle.sourcemap.contains("\"version\":3"));
    }

    #[tokio::test]
    async fn test_bundle_follows_relative_imports() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "util.js", "export const two = 2;\n");
        let entry = write(
            dir.path(),
            "sum.test.js",
            "import { it, expect } from 'vitest';\nimport { two } from './util';\nit('two', () => expect(two).toBe(2));\n",
        );

        let options = BundleOptions::new(dir.path());
        let bundle = bundle_file(&entry, &options).await.expect("bundle");

        assert!(bundle.code.contains("const two = 2;"));
        // Both modules registered, entry invoked last.
        assert!(bundle.code.matches("__modules[").count() >= 2);
    }

    #[tokio::test]
    async fn test_bundle_missing_import_is_file_scoped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let entry = write(
            dir.path(),
            "broken.test.js",
            "import { gone } from './nowhere';\n",
        );

        let options = BundleOptions::new(dir.path());
        let err = bundle_file(&entry, &options).await.expect_err("must fail");

        assert!(err.is_file_scoped());
        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_bundle_externals_stay_require() {
        let dir = tempfile::tempdir().expect("tempdir");
        let entry = write(
            dir.path(),
            "host.test.js",
            "import fs from 'uxp-fs';\nimport { it } from 'vitest';\nit('x', () => fs);\n",
        );

        let mut options = BundleOptions::new(dir.path());
        options.externals.push("uxp-fs".to_string());
        let bundle = bundle_file(&entry, &options).await.expect("bundle");

        assert!(bundle.code.contains("require(\"uxp-fs\")"));
    }
}
