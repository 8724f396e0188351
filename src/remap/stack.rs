//! Stack trace rewriting.
//!
//! Scans `at … file:line:col` frames and swaps bundled coordinates for
//! original ones when a stored map covers the file. Unmapped frames pass
//! through untouched unless filtered, so a trace is always shown.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;

use super::sourcemap::SourceMapIndex;

// ============================================================================
// Frame Regex
// ============================================================================

/// One V8-style stack frame line: `at fn (file:line:col)` or
/// `at file:line:col`.
static FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*at\s+(?:.*?\()?)(.+?):(\d+):(\d+)(\)?)\s*$").expect("frame regex")
});

// ============================================================================
// Remapping
// ============================================================================

/// Rewrites every mappable frame of a stack trace.
///
/// Stack coordinates are 1-based; sourcemap columns are 0-based — the
/// conversion happens here so callers deal in stack convention only.
/// Frames whose path contains `filter` are dropped entirely (worker
/// runtime internals); everything else passes through.
#[must_use]
pub fn remap_stack(stack: &str, index: &SourceMapIndex, filter: Option<&str>) -> String {
    stack
        .lines()
        .filter_map(|line| {
            let Some(caps) = FRAME.captures(line) else {
                // Message lines and exotic frames pass through.
                return Some(line.to_string());
            };

            let file = &caps[2];

            if let Some(needle) = filter {
                if file.contains(needle) {
                    return None;
                }
            }

            let (Ok(frame_line), Ok(frame_col)) =
                (caps[3].parse::<u32>(), caps[4].parse::<u32>())
            else {
                return Some(line.to_string());
            };

            match index.remap_position(file, frame_line, frame_col.saturating_sub(1)) {
                Some(original) => Some(format!(
                    "{}{}:{}:{}{}",
                    &caps[1],
                    original.source,
                    original.line,
                    original.column + 1,
                    &caps[5],
                )),
                None => Some(line.to_string()),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Synthesizes a code-frame excerpt for the first mappable frame.
///
/// Returns `None` when no frame maps or the mapped source carries no
/// embedded content.
#[must_use]
pub fn frame_excerpt(stack: &str, index: &SourceMapIndex) -> Option<String> {
    for line in stack.lines() {
        let Some(caps) = FRAME.captures(line) else {
            continue;
        };

        let file = &caps[2];
        let (Ok(frame_line), Ok(frame_col)) = (caps[3].parse::<u32>(), caps[4].parse::<u32>())
        else {
            continue;
        };

        let Some(map) = index.get(file) else {
            continue;
        };
        let Some(original) = map.lookup(frame_line, frame_col.saturating_sub(1)) else {
            continue;
        };
        let Some(content) = map.source_content(&original.source) else {
            continue;
        };

        return Some(super::frame::code_frame(
            content,
            original.line,
            original.column,
            2,
        ));
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index_with_map() -> SourceMapIndex {
        let mut index = SourceMapIndex::new();
        // Generated lines 3 and 4 map to original lines 1 and 2.
        let json = json!({
            "version": 3,
            "file": "/p/a.test.js",
            "sources": ["/p/a.orig.js"],
            "sourcesContent": ["const a = 1;\nthrow new Error('boom');\n"],
            "names": [],
            "mappings": ";;AAAA;AACA",
        })
        .to_string();
        index.store("/p/a.test.js", &json).expect("store");
        index
    }

    #[test]
    fn test_remap_named_frame() {
        let index = index_with_map();
        let stack = "Error: boom\n    at thrower (/p/a.test.js:4:7)";

        let remapped = remap_stack(stack, &index, None);

        assert!(remapped.contains("Error: boom"));
        assert!(remapped.contains("at thrower (/p/a.orig.js:2:7)"));
        assert!(!remapped.contains("a.test.js"));
    }

    #[test]
    fn test_remap_bare_frame() {
        let index = index_with_map();
        let stack = "    at /p/a.test.js:3:1";

        let remapped = remap_stack(stack, &index, None);
        assert_eq!(remapped, "    at /p/a.orig.js:1:1");
    }

    #[test]
    fn test_unmapped_frame_passes_through() {
        let index = index_with_map();
        let stack = "    at install (/host/runtime.js:900:13)";

        let remapped = remap_stack(stack, &index, None);
        assert_eq!(remapped, stack);
    }

    #[test]
    fn test_filter_drops_internal_frames() {
        let index = index_with_map();
        let stack = concat!(
            "Error: boom\n",
            "    at thrower (/p/a.test.js:4:7)\n",
            "    at run (cdp-pool:worker:120:9)"
        );

        let remapped = remap_stack(stack, &index, Some("cdp-pool:worker"));

        assert!(remapped.contains("a.orig.js"));
        assert!(!remapped.contains("cdp-pool:worker"));
    }

    #[test]
    fn test_frame_excerpt_points_at_throw() {
        let index = index_with_map();
        let stack = "Error: boom\n    at /p/a.test.js:4:7";

        let excerpt = frame_excerpt(stack, &index).expect("excerpt");
        assert!(excerpt.contains("throw new Error('boom');"));
        assert!(excerpt.contains('^'));
    }

    #[test]
    fn test_frame_excerpt_none_without_map() {
        let index = SourceMapIndex::new();
        assert!(frame_excerpt("    at /p/x.js:1:1", &index).is_none());
    }
}
