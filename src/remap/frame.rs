//! Code-frame excerpt synthesis.
//!
//! Renders a few lines of original source around a failure with a caret
//! under the offending column, replicating what the host framework's
//! pretty-printer shows for files it loaded itself.

// ============================================================================
// Code Frame
// ============================================================================

/// Renders a source excerpt around `line` (1-based) with a caret at
/// `column` (0-based).
///
/// ```text
///   1 | const a = 1;
/// > 2 | throw new Error('boom');
///     |       ^
///   3 | done();
/// ```
#[must_use]
pub fn code_frame(content: &str, line: u32, column: u32, context: u32) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() || line == 0 {
        return String::new();
    }

    let target = (line as usize).min(lines.len());
    let first = target.saturating_sub(context as usize + 1) + 1;
    let last = (target + context as usize).min(lines.len());
    let width = last.to_string().len();

    let mut out = String::new();
    for number in first..=last {
        let text = lines[number - 1];
        let marker = if number == target { ">" } else { " " };
        out.push_str(&format!("{marker} {number:>width$} | {text}\n"));

        if number == target {
            let caret_pad = " ".repeat(column as usize);
            out.push_str(&format!("  {:>width$} | {caret_pad}^\n", ""));
        }
    }

    out.pop();
    out
}

// ============================================================================
// Tests
// ============================================================================
