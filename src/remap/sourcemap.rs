//! V3 sourcemap parsing and position lookup.
//!
//! Parses the `mappings` VLQ string into per-line segment tables and
//! answers "what original coordinate does generated `line:col` come
//! from?" with a binary search. [`SourceMapIndex`] keeps one parsed map
//! per bundled file; entries are populated once per bundle and never
//! invalidated mid-run.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::{Error, Result};

// ============================================================================
// Raw Format
// ============================================================================

/// On-disk V3 sourcemap shape.
#[derive(Debug, Deserialize)]
struct RawSourceMap {
    version: u32,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(rename = "sourcesContent", default)]
    sources_content: Vec<Option<String>>,
    #[serde(default)]
    mappings: String,
}

// ============================================================================
// Segment
// ============================================================================

/// One decoded mapping segment.
#[derive(Debug, Clone, Copy)]
struct Segment {
    /// Generated column (0-based).
    gen_col: u32,
    /// Source file index.
    src_idx: u32,
    /// Original line (0-based).
    src_line: u32,
    /// Original column (0-based).
    src_col: u32,
}

// ============================================================================
// OriginalPosition
// ============================================================================

/// A resolved original-source coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    /// Original source path.
    pub source: String,
    /// Line number (1-based, matching stack traces).
    pub line: u32,
    /// Column number (0-based).
    pub column: u32,
}

// ============================================================================
// SourceMap
// ============================================================================

/// A parsed sourcemap ready for lookups.
#[derive(Debug, Clone)]
pub struct SourceMap {
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    /// Segments per generated line, sorted by generated column.
    lines: Vec<Vec<Segment>>,
}

impl SourceMap {
    /// Parses sourcemap JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceMap`] for malformed JSON, an unsupported
    /// version, or corrupt VLQ data.
    pub fn parse(file: &str, json: &str) -> Result<Self> {
        let raw: RawSourceMap = serde_json::from_str(json)
            .map_err(|e| Error::sourcemap(file, format!("invalid JSON: {e}")))?;

        if raw.version != 3 {
            return Err(Error::sourcemap(
                file,
                format!("unsupported sourcemap version {}", raw.version),
            ));
        }

        let mut lines: Vec<Vec<Segment>> = Vec::new();
        let mut src_idx: i64 = 0;
        let mut src_line: i64 = 0;
        let mut src_col: i64 = 0;

        for group in raw.mappings.split(';') {
            let mut segments = Vec::new();
            let mut gen_col: i64 = 0;

            for segment in group.split(',').filter(|s| !s.is_empty()) {
                let fields = vlq_decode(segment)
                    .map_err(|e| Error::sourcemap(file, format!("corrupt mappings: {e}")))?;

                match fields.len() {
                    1 => {
                        gen_col += fields[0];
                    }
                    4 | 5 => {
                        gen_col += fields[0];
                        src_idx += fields[1];
                        src_line += fields[2];
                        src_col += fields[3];

                        if gen_col >= 0 && src_idx >= 0 && src_line >= 0 && src_col >= 0 {
                            segments.push(Segment {
                                gen_col: gen_col as u32,
                                src_idx: src_idx as u32,
                                src_line: src_line as u32,
                                src_col: src_col as u32,
                            });
                        }
                    }
                    n => {
                        return Err(Error::sourcemap(
                            file,
                            format!("segment with {n} fields"),
                        ));
                    }
                }
            }

            segments.sort_by_key(|s| s.gen_col);
            lines.push(segments);
        }

        Ok(Self {
            sources: raw.sources,
            sources_content: raw.sources_content,
            lines,
        })
    }

    /// Looks up the original position of generated `line:column`.
    ///
    /// `line` is 1-based (stack trace convention), `column` 0-based. The
    /// greatest segment at or before `column` on that line wins.
    #[must_use]
    pub fn lookup(&self, line: u32, column: u32) -> Option<OriginalPosition> {
        let segments = self.lines.get(line.checked_sub(1)? as usize)?;
        if segments.is_empty() {
            return None;
        }

        let idx = match segments.binary_search_by_key(&column, |s| s.gen_col) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let segment = segments[idx];

        Some(OriginalPosition {
            source: self.sources.get(segment.src_idx as usize)?.clone(),
            line: segment.src_line + 1,
            column: segment.src_col,
        })
    }

    /// Returns the embedded content of an original source, if present.
    #[must_use]
    pub fn source_content(&self, source: &str) -> Option<&str> {
        let idx = self.sources.iter().position(|s| s == source)?;
        self.sources_content.get(idx)?.as_deref()
    }
}

// ============================================================================
// SourceMapIndex
// ============================================================================

/// Parsed maps keyed by bundled filepath.
#[derive(Debug, Default)]
pub struct SourceMapIndex {
    maps: FxHashMap<String, SourceMap>,
}

impl SourceMapIndex {
    /// Creates an empty index.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and retains the map for one bundled file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceMap`] if parsing fails; the index is left
    /// unchanged for that file.
    pub fn store(&mut self, filepath: &str, json: &str) -> Result<()> {
        let map = SourceMap::parse(filepath, json)?;
        self.maps.insert(filepath.to_string(), map);
        Ok(())
    }

    /// Returns the parsed map for a bundled file.
    #[inline]
    #[must_use]
    pub fn get(&self, filepath: &str) -> Option<&SourceMap> {
        self.maps.get(filepath)
    }

    /// Single-lookup remap of one generated coordinate.
    #[must_use]
    pub fn remap_position(
        &self,
        filepath: &str,
        line: u32,
        column: u32,
    ) -> Option<OriginalPosition> {
        self.maps.get(filepath)?.lookup(line, column)
    }

    /// Number of stored maps.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Returns `true` if no maps are stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

// ============================================================================
// VLQ
// ============================================================================

/// Decodes one comma-free VLQ segment into its signed fields.
fn vlq_decode(segment: &str) -> std::result::Result<Vec<i64>, String> {
    const CONTINUATION: u32 = 0x20;

    let mut fields = Vec::with_capacity(5);
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    for ch in segment.chars() {
        let digit = b64_digit(ch).ok_or_else(|| format!("invalid VLQ character {ch:?}"))?;

        value |= u64::from(digit & 0x1f) << shift;

        if digit & CONTINUATION == 0 {
            let signed = if value & 1 == 1 {
                -((value >> 1) as i64)
            } else {
                (value >> 1) as i64
            };
            fields.push(signed);
            value = 0;
            shift = 0;
        } else {
            shift += 5;
            if shift > 45 {
                return Err("VLQ value too large".to_string());
            }
        }
    }

    if shift != 0 {
        return Err("truncated VLQ segment".to_string());
    }

    Ok(fields)
}

/// Base64 digit value of a mappings character.
fn b64_digit(ch: char) -> Option<u32> {
    match ch {
        'A'..='Z' => Some(ch as u32 - 'A' as u32),
        'a'..='z' => Some(ch as u32 - 'a' as u32 + 26),
        '0'..='9' => Some(ch as u32 - '0' as u32 + 52),
        '+' => Some(62),
        '/' => Some(63),
        _ => None,
    }
}

/// Test-only VLQ encoder, the inverse of [`vlq_decode`].
#[cfg(test)]
pub(crate) fn tests_vlq_encode(value: i64, out: &mut String) {
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
            digit |= 0x20;
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
