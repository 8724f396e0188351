//! Bundle emission.
//!
//! Wraps each module in a lazy CommonJS-style registry function inside one
//! IIFE, rewrites import/export syntax line-for-line, and produces a
//! line-level V3 sourcemap. Appending a `sourceURL` comment names the
//! script inside the remote runtime, so stack frames carry the entry path
//! and stay remappable.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;

use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::json;

use crate::error::{Error, Result};

use super::graph::{Module, ModuleGraph};
use super::resolve::{
    parse_clause, Resolution, EXPORT_DECL, EXPORT_DEFAULT, EXPORT_FROM, EXPORT_LOCAL,
    EXPORT_STAR, IMPORT_BARE, IMPORT_FROM, IMPORT_NAMESPACE, REQUIRE_CALL,
};
use super::{Bundle, BundleOptions};

// ============================================================================
// Constants
// ============================================================================

/// Registry key the require shim intercepts for test-authoring imports.
pub const RUNNER_MODULE_KEY: &str = "cdp-pool:runner";

/// Global installed by the worker runtime, returned for runner imports.
const RUNNER_GLOBAL: &str = "globalThis.__CDP_POOL_API__";

// ============================================================================
// Emission
// ============================================================================

/// Emits the bundle for a loaded graph.
pub(crate) fn emit(graph: &ModuleGraph, entry: &Path, options: &BundleOptions) -> Result<Bundle> {
    let entry_key = module_key(entry, options);
    let entry_display = entry.display().to_string();

    let defines: Vec<(Regex, &str)> = options
        .defines
        .iter()
        .filter_map(|(name, replacement)| {
            Regex::new(&format!(r"\b{}\b", regex::escape(name)))
                .ok()
                .map(|re| (re, replacement.as_str()))
        })
        .collect();

    let mut lines: Vec<String> = Vec::new();
    let mut map = SourceMapBuilder::new();

    // Preamble: registry, cache, host-require fallback, interop helper.
    let runner_gate = format!(
        "if (key === {}) {{ return {RUNNER_GLOBAL}; }}",
        quote(RUNNER_MODULE_KEY)
    );
    for line in [
        "(function () {",
        "'use strict';",
        "var __modules = Object.create(null);",
        "var __cache = Object.create(null);",
        "var __host_require = typeof require === 'function' ? require : null;",
        "function __default(m) { return m && m.__esModule ? m.default : m; }",
        "function __require(key) {",
        runner_gate.as_str(),
        "if (__modules[key] === undefined) {",
        "if (__host_require) { return __host_require(key); }",
        "throw new Error('Cannot find module: ' + key);",
        "}",
        "if (__cache[key] !== undefined) { return __cache[key].exports; }",
        "var module = { exports: {} };",
        "__cache[key] = module;",
        "__modules[key](module, module.exports, __require);",
        "return module.exports;",
        "}",
    ] {
        lines.push(line.to_string());
    }

    if let Some(banner) = &options.banner {
        for line in banner.lines() {
            lines.push(line.to_string());
        }
    }

    for (_, module) in graph.iter() {
        let key = module_key(&module.path, options);
        let src_idx = map.add_source(&module.path.display().to_string(), &module.source);

        lines.push(format!(
            "__modules[{}] = function (module, exports, require) {{",
            quote(&key)
        ));

        let mut footer: Vec<String> = Vec::new();
        let mut esm = false;

        for (line_idx, line) in module.source.lines().enumerate() {
            let rewritten =
                transform_line(line, module, options, &mut footer, &mut esm)?;
            let rewritten = apply_defines(&rewritten, &defines);

            map.add_line_mapping(lines.len() as u32, src_idx, line_idx as u32);
            lines.push(rewritten);
        }

        if esm {
            lines.push("module.exports.__esModule = true;".to_string());
        }
        lines.extend(footer);
        lines.push("};".to_string());
    }

    lines.push(format!("__require({});", quote(&entry_key)));
    lines.push("})();".to_string());
    lines.push(format!("//# sourceURL={entry_display}"));

    let mut code = lines.join("\n");
    code.push('\n');

    Ok(Bundle {
        code,
        sourcemap: map.generate(&entry_display),
    })
}

// ============================================================================
// Line Rewriting
// ============================================================================

/// Rewrites one source line, keeping the output single-line.
fn transform_line(
    line: &str,
    module: &Module,
    options: &BundleOptions,
    footer: &mut Vec<String>,
    esm: &mut bool,
) -> Result<String> {
    if EXPORT_STAR.is_match(line) {
        return Err(Error::bundle(
            &module.path,
            "`export *` is not supported in bundled test files",
        ));
    }

    let out = if let Some(caps) = IMPORT_NAMESPACE.captures(line) {
        *esm = true;
        let key = specifier_key(&caps[2], module, options);
        format!("var {} = require({});", &caps[1], quote(&key))
    } else if let Some(caps) = IMPORT_FROM.captures(line) {
        *esm = true;
        let key = specifier_key(&caps[3], module, options);
        let mut parts: Vec<String> = Vec::new();
        if let Some(default) = caps.get(1) {
            parts.push(format!(
                "var {} = __default(require({}));",
                default.as_str(),
                quote(&key)
            ));
        }
        if let Some(named) = caps.get(2) {
            let bindings: Vec<String> = parse_clause(named.as_str())
                .into_iter()
                .map(|(from, to)| {
                    if from == to {
                        from
                    } else {
                        format!("{from}: {to}")
                    }
                })
                .collect();
            if !bindings.is_empty() {
                parts.push(format!(
                    "var {{ {} }} = require({});",
                    bindings.join(", "),
                    quote(&key)
                ));
            }
        }
        if parts.is_empty() {
            format!("require({});", quote(&key))
        } else {
            parts.join(" ")
        }
    } else if let Some(caps) = IMPORT_BARE.captures(line) {
        let key = specifier_key(&caps[1], module, options);
        format!("require({});", quote(&key))
    } else if let Some(caps) = EXPORT_FROM.captures(line) {
        *esm = true;
        let key = specifier_key(&caps[2], module, options);
        for (from, to) in parse_clause(&caps[1]) {
            footer.push(format!(
                "module.exports.{to} = require({}).{from};",
                quote(&key)
            ));
        }
        ";".to_string()
    } else if EXPORT_DEFAULT.is_match(line) {
        *esm = true;
        EXPORT_DEFAULT
            .replace(line, "${1}exports.default = ")
            .into_owned()
    } else if let Some(caps) = EXPORT_DECL.captures(line) {
        *esm = true;
        footer.push(format!("module.exports.{0} = {0};", &caps[2]));
        line.replacen("export ", "", 1)
    } else if let Some(caps) = EXPORT_LOCAL.captures(line) {
        *esm = true;
        for (from, to) in parse_clause(&caps[1]) {
            footer.push(format!("module.exports.{to} = {from};"));
        }
        ";".to_string()
    } else {
        line.to_string()
    };

    // Remaining raw require('…') calls get their specifiers mapped too.
    let out = REQUIRE_CALL
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            match module.resolutions.get(&caps[1]) {
                Some(resolution) => {
                    format!("require({})", quote(&resolution_key(resolution, options)))
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    Ok(out)
}

/// Maps a specifier through the module's resolution table.
fn specifier_key(specifier: &str, module: &Module, options: &BundleOptions) -> String {
    module
        .resolutions
        .get(specifier)
        .map_or_else(|| specifier.to_string(), |r| resolution_key(r, options))
}

/// The registry key a resolution is stored (or intercepted) under.
fn resolution_key(resolution: &Resolution, options: &BundleOptions) -> String {
    match resolution {
        Resolution::RunnerApi => RUNNER_MODULE_KEY.to_string(),
        Resolution::External(specifier) => specifier.clone(),
        Resolution::Module(path) => module_key(path, options),
    }
}

/// Registry key for a module path: project-relative when possible.
fn module_key(path: &Path, options: &BundleOptions) -> String {
    path.strip_prefix(&options.project_root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Applies whole-word define substitutions.
fn apply_defines(line: &str, defines: &[(Regex, &str)]) -> String {
    let mut out = line.to_string();
    for (re, replacement) in defines {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}

/// JS/JSON string literal quoting.
fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""))
}

// ============================================================================
// Source Map Builder
// ============================================================================

/// Accumulates line-level mappings and renders a V3 sourcemap.
struct SourceMapBuilder {
    /// Original source paths.
    sources: Vec<String>,
    /// Original source contents.
    contents: Vec<String>,
    /// (output_line, source_idx, source_line), all 0-based.
    mappings: Vec<(u32, u32, u32)>,
}

impl SourceMapBuilder {
    fn new() -> Self {
        Self {
            sources: Vec::new(),
            contents: Vec::new(),
            mappings: Vec::new(),
        }
    }

    /// Registers a source file and returns its index.
    fn add_source(&mut self, path: &str, content: &str) -> u32 {
        let idx = self.sources.len() as u32;
        self.sources.push(path.to_string());
        self.contents.push(content.to_string());
        idx
    }

    /// Maps one output line onto one source line (columns stay 0).
    fn add_line_mapping(&mut self, output_line: u32, source_idx: u32, source_line: u32) {
        self.mappings.push((output_line, source_idx, source_line));
    }

    /// Renders the V3 sourcemap JSON.
    fn generate(&self, file: &str) -> String {
        let mut mappings = String::new();
        let mut current_line: u32 = 0;
        let mut prev_source: i64 = 0;
        let mut prev_source_line: i64 = 0;

        for &(output_line, source_idx, source_line) in &self.mappings {
            while current_line < output_line {
                mappings.push(';');
                current_line += 1;
            }

            vlq_encode(0, &mut mappings);
            vlq_encode(i64::from(source_idx) - prev_source, &mut mappings);
            vlq_encode(i64::from(source_line) - prev_source_line, &mut mappings);
            vlq_encode(0, &mut mappings);

            prev_source = i64::from(source_idx);
            prev_source_line = i64::from(source_line);
        }

        json!({
            "version": 3,
            "file": file,
            "sources": self.sources,
            "sourcesContent": self.contents,
            "names": [],
            "mappings": mappings,
        })
        .to_string()
    }
}

/// VLQ-encodes a signed integer and appends it.
fn vlq_encode(value: i64, out: &mut String) {
    const B64: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut v = (if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    }) as u64;
    loop {
        let mut digit = (v & 0x1f) as u8;
        v >>= 5;
        if v > 0 {
            digit |= 0x20; // continuation bit
        }
        out.push(B64[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn module(path: &str, source: &str, resolutions: &[(&str, Resolution)]) -> Module {
        Module {
            path: PathBuf::from(path),
            source: source.to_string(),
            resolutions: resolutions
                .iter()
                .map(|(s, r)| ((*s).to_string(), r.clone()))
                .collect(),
        }
    }

    fn rewrite(line: &str, module: &Module) -> (String, Vec<String>, bool) {
        let options = BundleOptions::new("/proj");
        let mut footer = Vec::new();
        let mut esm = false;
        let out =
            transform_line(line, module, &options, &mut footer, &mut esm).expect("transform");
        (out, footer, esm)
    }

    #[test]
    fn test_runner_import_redirects_to_global_key() {
        let m = module(
            "/proj/a.test.js",
            "",
            &[("vitest", Resolution::RunnerApi)],
        );
        let (out, _, esm) = rewrite("import { it, expect } from 'vitest';", &m);
        assert_eq!(
            out,
            "var { it, expect } = require(\"cdp-pool:runner\");"
        );
        assert!(esm);
    }

    #[test]
    fn test_default_import_uses_interop() {
        let m = module(
            "/proj/a.test.js",
            "",
            &[("./util", Resolution::Module(PathBuf::from("/proj/util.js")))],
        );
        let (out, _, _) = rewrite("import util from './util';", &m);
        assert_eq!(out, "var util = __default(require(\"util.js\"));");
    }

    #[test]
    fn test_mixed_import() {
        let m = module(
            "/proj/a.test.js",
            "",
            &[("./util", Resolution::Module(PathBuf::from("/proj/util.js")))],
        );
        let (out, _, _) = rewrite("import util, { two as deux } from './util';", &m);
        assert!(out.contains("var util = __default(require(\"util.js\"));"));
        assert!(out.contains("var { two: deux } = require(\"util.js\");"));
    }

    #[test]
    fn test_export_decl_strips_and_records() {
        let m = module("/proj/util.js", "", &[]);
        let (out, footer, esm) = rewrite("export const two = 2;", &m);
        assert_eq!(out, "const two = 2;");
        assert_eq!(footer, vec!["module.exports.two = two;"]);
        assert!(esm);
    }

    #[test]
    fn test_export_default_function_prefix_rewrite() {
        let m = module("/proj/util.js", "", &[]);
        let (out, _, _) = rewrite("export default function sum(a, b) {", &m);
        assert_eq!(out, "exports.default = function sum(a, b) {");
    }

    #[test]
    fn test_export_star_is_rejected() {
        let options = BundleOptions::new("/proj");
        let m = module("/proj/util.js", "", &[]);
        let mut footer = Vec::new();
        let mut esm = false;
        let err = transform_line("export * from './other';", &m, &options, &mut footer, &mut esm)
            .expect_err("must fail");
        assert!(err.to_string().contains("export *"));
    }

    #[test]
    fn test_raw_require_specifier_is_mapped() {
        let m = module(
            "/proj/a.test.js",
            "",
            &[("./util", Resolution::Module(PathBuf::from("/proj/util.js")))],
        );
        let (out, _, _) = rewrite("const u = require('./util');", &m);
        assert_eq!(out, "const u = require(\"util.js\");");
    }

    #[test]
    fn test_vlq_encode_known_values() {
        // Reference values from the sourcemap V3 spec alphabet.
        let mut s = String::new();
        vlq_encode(0, &mut s);
        assert_eq!(s, "A");

        let mut s = String::new();
        vlq_encode(1, &mut s);
        assert_eq!(s, "C");

        let mut s = String::new();
        vlq_encode(-1, &mut s);
        assert_eq!(s, "D");

        let mut s = String::new();
        vlq_encode(16, &mut s);
        assert_eq!(s, "gB");
    }

    #[test]
    fn test_sourcemap_builder_line_gaps() {
        let mut builder = SourceMapBuilder::new();
        builder.add_source("/proj/a.test.js", "line0\nline1\n");
        builder.add_line_mapping(2, 0, 0);
        builder.add_line_mapping(3, 0, 1);

        let map = builder.generate("/proj/a.test.js");
        let parsed: serde_json::Value = serde_json::from_str(&map).expect("json");

        assert_eq!(parsed["version"], 3);
        // Two unmapped preamble lines, then segments "AAAA" and "AACA".
        assert_eq!(parsed["mappings"], ";;AAAA;AACA");
    }
}
