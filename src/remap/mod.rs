//! Stack and source remapping.
//!
//! Failures come back with bundled-code coordinates. This module stores
//! the sourcemap produced for each bundled file, rewrites stack frames and
//! task locations back to original source coordinates **in place**, and
//! synthesizes a code-frame excerpt for errors — the original file never
//! went through the host framework's own module graph, so its pretty
//! printer has nothing to show without us.

// ============================================================================
// Modules
// ============================================================================

mod frame;
mod sourcemap;
mod stack;

pub use frame::code_frame;
pub use sourcemap::{OriginalPosition, SourceMap, SourceMapIndex};
pub use stack::remap_stack;

// ============================================================================
// Imports
// ============================================================================

use crate::task::TaskSet;

// ============================================================================
// Composite Remapping
// ============================================================================

/// Remaps every task location and error in a set, in place.
///
/// `filter` drops stack frames whose path contains the given substring
/// (used to hide worker-runtime internals). Tasks and frames without a
/// stored map keep their bundled coordinates — a trace is always shown,
/// even if imprecise.
pub fn remap_tasks(tasks: &mut TaskSet, index: &SourceMapIndex, filter: Option<&str>) {
    for task in tasks.iter_mut() {
        let filepath = task.filepath.clone();

        if let Some(location) = task.location.as_mut() {
            if let Some(original) = index.remap_position(&filepath, location.line, location.column)
            {
                location.line = original.line;
                location.column = original.column;
            }
        }

        remap_errors(&mut task.errors, index, filter);
    }
}

/// Remaps error stacks and attaches code frames, in place.
///
/// Shared by full-tree remapping and incremental task updates.
pub fn remap_errors(
    errors: &mut [crate::task::TestError],
    index: &SourceMapIndex,
    filter: Option<&str>,
) {
    for error in errors {
        if let Some(raw_stack) = error.stack.take() {
            if error.code_frame.is_none() {
                error.code_frame = stack::frame_excerpt(&raw_stack, index);
            }
            error.stack = Some(remap_stack(&raw_stack, index, filter));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::TaskId;
    use crate::task::{Location, Task, TaskKind, TaskState, TestError};
    use serde_json::json;

    fn line_map(file: &str, source: &str, content: &str, pairs: &[(u32, u32)]) -> String {
        // Build a V3 map with the emitter's own encoder shape:
        // one segment per generated line.
        let mut mappings = String::new();
        let mut current = 0u32;
        let mut prev_line: i64 = 0;
        for &(gen_line, src_line) in pairs {
            while current < gen_line {
                mappings.push(';');
                current += 1;
            }
            for value in [0, 0, i64::from(src_line) - prev_line, 0] {
                super::sourcemap::tests_vlq_encode(value, &mut mappings);
            }
            prev_line = i64::from(src_line);
        }
        json!({
            "version": 3,
            "file": file,
            "sources": [source],
            "sourcesContent": [content],
            "names": [],
            "mappings": mappings,
        })
        .to_string()
    }

    #[test]
    fn test_remap_tasks_in_place() {
        let mut index = SourceMapIndex::new();
        // Generated line 21 (1-based) maps to original line 2.
        index
            .store(
                "/p/a.test.js",
                &line_map(
                    "/p/a.test.js",
                    "/p/a.orig.js",
                    "line one\nthrow new Error('boom')\nline three\n",
                    &[(20, 1)],
                ),
            )
            .expect("store");

        let mut tasks = TaskSet::new();
        tasks.insert(Task {
            id: TaskId::from("t1"),
            parent: None,
            filepath: "/p/a.test.js".to_string(),
            kind: TaskKind::Test,
            name: "boom".to_string(),
            state: TaskState::Fail,
            duration_ms: Some(1.0),
            location: Some(Location {
                line: 21,
                column: 0,
            }),
            errors: vec![TestError {
                message: "boom".to_string(),
                stack: Some("Error: boom\n    at /p/a.test.js:21:7".to_string()),
                ..TestError::default()
            }],
        });

        remap_tasks(&mut tasks, &index, None);

        let task = tasks.get(&TaskId::from("t1")).expect("task");
        assert_eq!(task.location, Some(Location { line: 2, column: 0 }));

        let error = &task.errors[0];
        assert!(error.stack.as_ref().expect("stack").contains("/p/a.orig.js:2:"));
        let frame = error.code_frame.as_ref().expect("code frame");
        assert!(frame.contains("throw new Error('boom')"));
        assert!(frame.contains('^'));
    }

    #[test]
    fn test_remap_tasks_without_map_keeps_coordinates() {
        let index = SourceMapIndex::new();

        let mut tasks = TaskSet::new();
        tasks.insert(Task {
            id: TaskId::from("t1"),
            parent: None,
            filepath: "/p/a.test.js".to_string(),
            kind: TaskKind::Test,
            name: "x".to_string(),
            state: TaskState::Fail,
            duration_ms: None,
            location: Some(Location { line: 9, column: 4 }),
            errors: vec![TestError {
                message: "x".to_string(),
                stack: Some("Error: x\n    at /p/a.test.js:9:5".to_string()),
                ..TestError::default()
            }],
        });

        remap_tasks(&mut tasks, &index, None);

        let task = tasks.get(&TaskId::from("t1")).expect("task");
        assert_eq!(task.location, Some(Location { line: 9, column: 4 }));
        assert!(task.errors[0]
            .stack
            .as_ref()
            .expect("stack")
            .contains("/p/a.test.js:9:5"));
    }
}
