//! Module dependency graph.
//!
//! Tracks the modules a test file reaches through relative imports,
//! deduplicated by normalized path. Modules are wrapped in lazy registry
//! functions at emit time, so discovery order (entry first) is the only
//! ordering the emitter needs.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tokio::fs;

use crate::error::{Error, Result};

use super::resolve::{self, Resolution};
use super::BundleOptions;

// ============================================================================
// Types
// ============================================================================

/// Index of a module within its graph.
pub type ModuleId = usize;

/// A module in the dependency graph.
#[derive(Debug, Clone)]
pub struct Module {
    /// Normalized absolute path.
    pub path: PathBuf,
    /// Source code.
    pub source: String,
    /// Specifier → resolution, for every specifier this module mentions.
    pub resolutions: FxHashMap<String, Resolution>,
}

/// The module dependency graph for one entry file.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    path_to_id: FxHashMap<PathBuf, ModuleId>,
}

impl ModuleGraph {
    /// Loads the graph reachable from `entry`.
    ///
    /// The entry is read first and every path exactly once, so import
    /// cycles terminate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bundle`] for unreadable files or unresolvable
    /// relative imports.
    pub async fn load(entry: &Path, options: &BundleOptions) -> Result<Self> {
        let mut graph = Self::default();
        let mut queue: Vec<PathBuf> = vec![entry.to_path_buf()];

        while let Some(path) = queue.pop() {
            if graph.path_to_id.contains_key(&path) {
                continue;
            }

            let source = fs::read_to_string(&path)
                .await
                .map_err(|e| Error::bundle(&path, format!("cannot read module: {e}")))?;

            let mut resolutions = FxHashMap::default();
            for line in source.lines() {
                for specifier in resolve::line_specifiers(line) {
                    if resolutions.contains_key(&specifier) {
                        continue;
                    }
                    let resolution = resolve::resolve(&specifier, &path, options)?;
                    if let Resolution::Module(ref target) = resolution {
                        queue.push(target.clone());
                    }
                    resolutions.insert(specifier, resolution);
                }
            }

            let id = graph.modules.len();
            graph.path_to_id.insert(path.clone(), id);
            graph.modules.push(Module {
                path,
                source,
                resolutions,
            });
        }

        Ok(graph)
    }

    /// Number of modules in the graph.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if the graph holds no modules.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterates modules in discovery order (entry first).
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[tokio::test]
    async fn test_load_dedups_shared_import() {
        let dir = tempfile::tempdir().expect("tempdir");
        stdfs::write(dir.path().join("shared.js"), "export const s = 1;\n").expect("write");
        stdfs::write(
            dir.path().join("a.js"),
            "import { s } from './shared';\nexport const a = s;\n",
        )
        .expect("write");
        stdfs::write(
            dir.path().join("entry.test.js"),
            "import { a } from './a';\nimport { s } from './shared';\n",
        )
        .expect("write");

        let options = BundleOptions::new(dir.path());
        let graph = ModuleGraph::load(&dir.path().join("entry.test.js"), &options)
            .await
            .expect("load");

        // entry + a + shared, shared only once.
        assert_eq!(graph.len(), 3);
    }

    #[tokio::test]
    async fn test_load_tolerates_import_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        stdfs::write(
            dir.path().join("ping.js"),
            "import { pong } from './pong';\nexport const ping = 1;\n",
        )
        .expect("write");
        stdfs::write(
            dir.path().join("pong.js"),
            "import { ping } from './ping';\nexport const pong = 2;\n",
        )
        .expect("write");

        let options = BundleOptions::new(dir.path());
        let graph = ModuleGraph::load(&dir.path().join("ping.js"), &options)
            .await
            .expect("load");

        assert_eq!(graph.len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_entry_is_bundle_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = BundleOptions::new(dir.path());

        let err = ModuleGraph::load(&dir.path().join("ghost.test.js"), &options)
            .await
            .expect_err("must fail");
        assert!(err.is_file_scoped());
    }
}
