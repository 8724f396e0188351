//! Specifier scanning and resolution.
//!
//! A single pass over each module body finds every `import`/`export …
//! from`/`require` specifier, and resolution classifies it: runner
//! redirect, external/bare passthrough, or a relative module to load.
//! Relative resolution probes the usual extension set plus `index.js`.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

use super::BundleOptions;

// ============================================================================
// Regexes
// ============================================================================

/// `import defaultName` / `import { a, b as c }` / mixed, with `from`.
pub(crate) static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*import\s+(?:([A-Za-z_$][\w$]*)\s*,?\s*)?(?:\{([^}]*)\})?\s*from\s*['"]([^'"]+)['"]\s*;?\s*$"#,
    )
    .expect("import regex")
});

/// `import * as ns from '…'`.
pub(crate) static IMPORT_NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*import\s*\*\s*as\s+([A-Za-z_$][\w$]*)\s+from\s*['"]([^'"]+)['"]\s*;?\s*$"#,
    )
    .expect("namespace regex")
});

/// Side-effect only: `import '…'`.
pub(crate) static IMPORT_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s*['"]([^'"]+)['"]\s*;?\s*$"#).expect("bare import regex")
});

/// Re-export: `export { a, b as c } from '…'`.
pub(crate) static EXPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*export\s*\{([^}]*)\}\s*from\s*['"]([^'"]+)['"]\s*;?\s*$"#)
        .expect("re-export regex")
});

/// `export * from '…'` — unsupported, detected for a clear error.
pub(crate) static EXPORT_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*export\s*\*"#).expect("export star regex"));

/// `export const|let|var|function|async function|class NAME`.
pub(crate) static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*export\s+(const|let|var|function|async\s+function|class)\s+([A-Za-z_$][\w$]*)",
    )
    .expect("export decl regex")
});

/// `export default …`.
pub(crate) static EXPORT_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)export\s+default\s+").expect("export default regex"));

/// Local export clause: `export { a, b as c };`.
pub(crate) static EXPORT_LOCAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*export\s*\{([^}]*)\}\s*;?\s*$").expect("local export regex")
});

/// `require('…')` occurrences anywhere in a line.
pub(crate) static REQUIRE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("require regex")
});

// ============================================================================
// Resolution
// ============================================================================

/// What a specifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Redirect to the worker runtime's test-authoring global.
    RunnerApi,
    /// Keep as a real `require` for the host to satisfy.
    External(String),
    /// A project module to bundle.
    Module(PathBuf),
}

/// Extensions probed for a relative specifier, in order.
const PROBE_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".json"];

/// Resolves one specifier appearing in `from_file`.
///
/// # Errors
///
/// Returns [`Error::Bundle`] when a relative specifier matches nothing on
/// disk.
pub fn resolve(specifier: &str, from_file: &Path, options: &BundleOptions) -> Result<Resolution> {
    // Aliases first, so an alias can turn a bare name into a path.
    let specifier = options
        .aliases
        .get(specifier)
        .map_or(specifier, String::as_str);

    if options.runner_specifiers.iter().any(|s| s == specifier) {
        return Ok(Resolution::RunnerApi);
    }

    if options.externals.iter().any(|s| s == specifier) {
        return Ok(Resolution::External(specifier.to_string()));
    }

    if !specifier.starts_with('.') && !specifier.starts_with('/') {
        // Bare specifier: the host's module system owns it.
        return Ok(Resolution::External(specifier.to_string()));
    }

    let base = if specifier.starts_with('/') {
        options.project_root.join(specifier.trim_start_matches('/'))
    } else {
        from_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(specifier)
    };

    resolve_on_disk(&base).map(Resolution::Module).ok_or_else(|| {
        Error::bundle(
            from_file,
            format!("unresolved import {specifier:?} (probed {base:?})"),
        )
    })
}

/// Probes the filesystem for a concrete file behind `base`.
fn resolve_on_disk(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(normalize(base));
    }

    let rendered = base.to_string_lossy();
    for ext in PROBE_EXTENSIONS {
        let candidate = PathBuf::from(format!("{rendered}{ext}"));
        if candidate.is_file() {
            return Some(normalize(&candidate));
        }
    }

    let index = base.join("index.js");
    if index.is_file() {
        return Some(normalize(&index));
    }

    None
}

/// Collapses `.`/`..` segments without touching symlinks.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// Scanning
// ============================================================================

/// Extracts every specifier mentioned on a line, if any.
#[must_use]
pub fn line_specifiers(line: &str) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(caps) = IMPORT_NAMESPACE.captures(line) {
        out.push(caps[2].to_string());
    } else if let Some(caps) = IMPORT_FROM.captures(line) {
        out.push(caps[3].to_string());
    } else if let Some(caps) = IMPORT_BARE.captures(line) {
        out.push(caps[1].to_string());
    } else if let Some(caps) = EXPORT_FROM.captures(line) {
        out.push(caps[2].to_string());
    }

    for caps in REQUIRE_CALL.captures_iter(line) {
        out.push(caps[1].to_string());
    }

    out
}

/// Parses an export/import clause body: `a, b as c` → `[(a, a), (b, c)]`.
#[must_use]
pub fn parse_clause(body: &str) -> Vec<(String, String)> {
    body.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            match entry.split_once(" as ") {
                Some((from, to)) => Some((from.trim().to_string(), to.trim().to_string())),
                None => Some((entry.to_string(), entry.to_string())),
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
