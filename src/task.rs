//! Task tree model.
//!
//! A run produces a tree File → Suite* → Test*, flattened here into an
//! id-indexed table. Ids are worker-assigned and stable between a collect
//! pass and a run pass, so incremental updates merge by id. Merging and
//! location remapping mutate tasks **in place** — the table never replaces
//! a task wholesale, so every observer sees the same logical node.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::codec::Ref;
use crate::error::{Error, Result};
use crate::identifiers::TaskId;

// ============================================================================
// TaskKind
// ============================================================================

/// Node kind in the task tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// A test file.
    File,
    /// A `describe` block.
    Suite,
    /// An `it`/`test` case.
    Test,
}

impl TaskKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "suite" => Some(Self::Suite),
            "test" => Some(Self::Test),
            _ => None,
        }
    }
}

// ============================================================================
// TaskState
// ============================================================================

/// Execution state of a task-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Registered but not yet executed.
    Collected,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Pass,
    /// Finished with at least one error.
    Fail,
    /// Skipped (`.skip`/`.todo`).
    Skip,
}

impl TaskState {
    /// Parses the wire spelling used by the worker runtime.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "collected" => Some(Self::Collected),
            "run" | "running" => Some(Self::Running),
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "skip" | "todo" => Some(Self::Skip),
            _ => None,
        }
    }

    /// Returns `true` once the task can no longer change state.
    #[inline]
    #[must_use]
    pub fn is_final(self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Skip)
    }
}

// ============================================================================
// Location
// ============================================================================

/// Source coordinate of a task (1-based line, 0-based column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Line number.
    pub line: u32,
    /// Column number.
    pub column: u32,
}

// ============================================================================
// TestError
// ============================================================================

/// Structured failure attached to a task.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestError {
    /// Failure message.
    pub message: String,

    /// Error class name (`AssertionError`, `Error`…).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Stack trace, remapped to original source when maps are stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Expected value rendering (assertion failures).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,

    /// Actual value rendering (assertion failures).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,

    /// Source excerpt with caret, synthesized by the remapper.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_frame: Option<String>,
}

impl TestError {
    fn parse(node: Ref<'_>) -> Self {
        Self {
            message: node
                .get("message")
                .and_then(|r| r.as_str().map(str::to_string))
                .unwrap_or_default(),
            name: node.get("name").and_then(|r| r.as_str().map(str::to_string)),
            stack: node
                .get("stack")
                .and_then(|r| r.as_str().map(str::to_string)),
            expected: node
                .get("expected")
                .and_then(|r| r.as_str().map(str::to_string)),
            actual: node
                .get("actual")
                .and_then(|r| r.as_str().map(str::to_string)),
            code_frame: None,
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// One node of the task tree.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    /// Stable worker-assigned id.
    pub id: TaskId,

    /// Parent node id (`None` for files).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<TaskId>,

    /// Path of the file this node belongs to.
    pub filepath: String,

    /// Node kind.
    pub kind: TaskKind,

    /// Display name.
    pub name: String,

    /// Execution state.
    pub state: TaskState,

    /// Wall-clock duration in milliseconds, once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,

    /// Registration coordinate in the (bundled) source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    /// Failures, populated for `Fail`.
    pub errors: Vec<TestError>,
}

// ============================================================================
// TaskUpdate
// ============================================================================

/// An incremental state change pushed by the worker while a file runs.
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    /// Target task id.
    pub id: TaskId,

    /// New state.
    pub state: TaskState,

    /// Duration, present once the task finished.
    pub duration_ms: Option<f64>,

    /// Errors, present for failures.
    pub errors: Vec<TestError>,
}

impl TaskUpdate {
    /// Parses one update object from a payload node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if `id` or `state` are missing.
    pub fn parse(node: Ref<'_>) -> Result<Self> {
        let id = node
            .get("id")
            .and_then(|r| r.as_str())
            .ok_or_else(|| Error::codec("task update without id"))?;

        let state = node
            .get("state")
            .and_then(|r| r.as_str())
            .and_then(TaskState::parse)
            .ok_or_else(|| Error::codec("task update without state"))?;

        Ok(Self {
            id: TaskId::from(id),
            state,
            duration_ms: node.get("duration").and_then(|r| r.as_f64()),
            errors: node
                .get("errors")
                .map(|errors| errors.items().map(TestError::parse).collect())
                .unwrap_or_default(),
        })
    }

    /// Parses a batch of updates from a payload array node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] on the first malformed entry.
    pub fn parse_list(list: Ref<'_>) -> Result<Vec<Self>> {
        list.items().map(Self::parse).collect()
    }
}

// ============================================================================
// TaskSet
// ============================================================================

/// Id-indexed task table preserving registration order.
#[derive(Debug, Clone, Default)]
pub struct TaskSet {
    tasks: FxHashMap<TaskId, Task>,
    order: Vec<TaskId>,
}

impl TaskSet {
    /// Creates an empty set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the set holds no tasks.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Looks a task up by id.
    #[inline]
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Mutable lookup by id.
    #[inline]
    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Iterates tasks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Iterates tasks mutably (arbitrary order).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.values_mut()
    }

    /// Inserts a task, or refreshes an existing one in place.
    ///
    /// Re-collection of a known id updates fields on the existing entry
    /// rather than replacing it, preserving node identity.
    pub fn insert(&mut self, task: Task) {
        if let Some(existing) = self.tasks.get_mut(&task.id) {
            existing.name = task.name;
            existing.state = task.state;
            existing.location = task.location;
            existing.duration_ms = task.duration_ms;
            existing.errors = task.errors;
        } else {
            self.order.push(task.id.clone());
            self.tasks.insert(task.id.clone(), task);
        }
    }

    /// Applies an incremental update in place.
    ///
    /// Unknown ids are ignored (the update raced a reset) and reported via
    /// the return value.
    pub fn apply_update(&mut self, update: TaskUpdate) -> bool {
        match self.tasks.get_mut(&update.id) {
            Some(task) => {
                task.state = update.state;
                if update.duration_ms.is_some() {
                    task.duration_ms = update.duration_ms;
                }
                if !update.errors.is_empty() {
                    task.errors = update.errors;
                }
                true
            }
            None => false,
        }
    }

    /// Returns the ids of all test nodes, in order.
    #[must_use]
    pub fn test_ids(&self) -> Vec<TaskId> {
        self.iter()
            .filter(|t| t.kind == TaskKind::Test)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Parses a collected file node (with nested `tasks` arrays) into a set.
    ///
    /// The worker serializes parent back-references; traversal only follows
    /// the `tasks` edge and tracks visited ids, so cyclic payloads
    /// terminate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] on a node without id/type/name.
    pub fn parse_file(file: Ref<'_>) -> Result<Self> {
        let mut set = Self::new();
        let filepath = file
            .get("filepath")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();

        let mut stack: Vec<(Ref<'_>, Option<TaskId>)> = vec![(file, None)];

        while let Some((node, parent)) = stack.pop() {
            let id = node
                .get("id")
                .and_then(|r| r.as_str())
                .ok_or_else(|| Error::codec("task node without id"))?;
            let id = TaskId::from(id);

            if set.tasks.contains_key(&id) {
                continue;
            }

            let kind = node
                .get("type")
                .and_then(|r| r.as_str())
                .and_then(TaskKind::parse)
                .ok_or_else(|| Error::codec("task node without type"))?;

            let name = node
                .get("name")
                .and_then(|r| r.as_str())
                .ok_or_else(|| Error::codec("task node without name"))?
                .to_string();

            let state = node
                .get("state")
                .and_then(|r| r.as_str())
                .and_then(TaskState::parse)
                .unwrap_or(TaskState::Collected);

            let location = node.get("location").and_then(|loc| {
                Some(Location {
                    line: u32::try_from(loc.get("line")?.as_i64()?).ok()?,
                    column: u32::try_from(loc.get("column")?.as_i64()?).ok()?,
                })
            });

            let errors = node
                .get("errors")
                .map(|errors| errors.items().map(TestError::parse).collect())
                .unwrap_or_default();

            set.order.push(id.clone());
            set.tasks.insert(
                id.clone(),
                Task {
                    id: id.clone(),
                    parent: parent.clone(),
                    filepath: filepath.clone(),
                    kind,
                    name,
                    state,
                    duration_ms: node.get("duration").and_then(|r| r.as_f64()),
                    location,
                    errors,
                },
            );

            if let Some(children) = node.get("tasks") {
                // Reversed so registration order survives the LIFO stack.
                let collected: Vec<_> = children.items().collect();
                for child in collected.into_iter().rev() {
                    stack.push((child, Some(id.clone())));
                }
            }
        }

        Ok(set)
    }

    /// Builds the synthetic result for a file that failed to bundle:
    /// the file node plus exactly one failing test carrying the error.
    #[must_use]
    pub fn bundle_failure(filepath: &str, message: &str) -> Self {
        let file_id = TaskId::new(format!("{filepath}#bundle"));
        let test_id = TaskId::new(format!("{filepath}#bundle_0"));

        let mut set = Self::new();
        set.insert(Task {
            id: file_id.clone(),
            parent: None,
            filepath: filepath.to_string(),
            kind: TaskKind::File,
            name: filepath.to_string(),
            state: TaskState::Fail,
            duration_ms: None,
            location: None,
            errors: Vec::new(),
        });
        set.insert(Task {
            id: test_id,
            parent: Some(file_id),
            filepath: filepath.to_string(),
            kind: TaskKind::Test,
            name: "bundle".to_string(),
            state: TaskState::Fail,
            duration_ms: None,
            location: None,
            errors: vec![TestError {
                message: message.to_string(),
                name: Some("BundleError".to_string()),
                ..TestError::default()
            }],
        });
        set
    }
}

// ============================================================================
// Tests
// ============================================================================
