//! Source location codec
//!
//! Stack frames captured during synthesis end in a `(<file>:<line>:<col>)` suffix with
//! one-based numbers. Editors speak zero-based positions, and the position index is
//! keyed by `"<file>:<line>"`, so everything that crosses between the two goes
//! through here.
//!
//! Some frames report `0` for an unknown line or column. A zero stays zero instead of
//! wrapping, which is what `saturating_sub` gives us for free.

use lsp_types::{Position, Range};
use regex::Regex;
use std::{fmt, sync::LazyLock};

static LOCATION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((.*):(\d+):(\d+)\)$").expect("valid location regex"));

static FRAME_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(/.*:\d+:\d+.*\)").expect("valid frame regex"));

/// Reverse-index key: `"<file>:<zero-based line>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexKey(String);

impl IndexKey {
    pub fn new(file: &str, line: u32) -> Self {
        Self(format!("{}:{}", file, line))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed frame location, zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Parses the trailing `(<file>:<line>:<col>)` suffix of a raw frame.
    pub fn parse(raw: &str) -> Option<Self> {
        let captures = LOCATION_SUFFIX.captures(raw)?;
        let file = captures.get(1)?.as_str();
        let line = captures.get(2)?.as_str().parse::<u32>().ok()?;
        let column = captures.get(3)?.as_str().parse::<u32>().ok()?;

        Some(Self::new(file, to_zero_based(line), to_zero_based(column)))
    }

    pub fn index_key(&self) -> IndexKey {
        IndexKey::new(&self.file, self.line)
    }

    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            character: self.column,
        }
    }

    /// Zero-width range at the location.
    pub fn point_range(&self) -> Range {
        let position = self.position();
        Range {
            start: position,
            end: position,
        }
    }

    pub fn is_vendored(&self, vendor_markers: &[String]) -> bool {
        contains_vendor_marker(&self.file, vendor_markers)
    }
}

/// One-based to zero-based, keeping `0` as `0`.
pub fn to_zero_based(value: u32) -> u32 {
    value.saturating_sub(1)
}

/// Whether a raw stack frame points into an absolute source path with line and column.
pub fn is_frame(raw: &str) -> bool {
    FRAME_SHAPE.is_match(raw)
}

pub fn contains_vendor_marker(text: &str, vendor_markers: &[String]) -> bool {
    vendor_markers
        .iter()
        .any(|marker| !marker.is_empty() && text.contains(marker.as_str()))
}
