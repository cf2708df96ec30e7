//! `@tag(value)` extraction.
//!
//! The scanner works on a window of the document, usually an item's first
//! paragraph. Multi-line windows are joined with `\n` and a table of segment
//! starts maps scan offsets back to `(row, byte col)` positions. Values may
//! contain balanced parentheses and whole nested `@tag(...)` groups; those
//! belong to the outer value.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex_automata::meta::Regex;
use ropey::RopeSlice;

use crate::{
  position::{
    self,
    Position,
    TextRange,
  },
  registry::MetadataRegistry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
  pub tag:         String,
  pub value:       String,
  /// Covers `@tag(value)`.
  pub range:       TextRange,
  /// Covers `value` only.
  pub value_range: TextRange,
  /// Canonical name when `tag` is an alias.
  pub alias_for:   Option<String>,
}

impl MetadataEntry {
  pub fn canonical(&self) -> &str {
    self.alias_for.as_deref().unwrap_or(&self.tag)
  }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metadata {
  entries: Vec<MetadataEntry>,
  by_tag:  HashMap<String, usize>,
}

impl Metadata {
  pub fn entries(&self) -> &[MetadataEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Rightmost entry for a canonical tag name.
  pub fn get(&self, canonical: &str) -> Option<&MetadataEntry> {
    self.by_tag.get(canonical).map(|&idx| &self.entries[idx])
  }

  pub fn value(&self, canonical: &str) -> Option<&str> {
    self.get(canonical).map(|entry| entry.value.as_str())
  }

  /// Every entry for a canonical tag name, in document order.
  pub fn all<'a>(&'a self, canonical: &'a str) -> impl Iterator<Item = &'a MetadataEntry> + 'a {
    self
      .entries
      .iter()
      .filter(move |entry| entry.canonical() == canonical)
  }

  fn push(&mut self, entry: MetadataEntry) {
    self
      .by_tag
      .insert(entry.canonical().to_owned(), self.entries.len());
    self.entries.push(entry);
  }
}

fn tag_open_regex() -> &'static Regex {
  static REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::builder()
      .build(r"@[A-Za-z][A-Za-z0-9_-]*\(")
      .expect("metadata tag regex should compile")
  });

  &REGEX
}

/// Find the parenthesis that closes an already opened group.
fn find_closing_paren(src: &[u8]) -> Option<usize> {
  static REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::builder()
      .build("[()]")
      .expect("paren regex should compile")
  });

  let mut depth = 0;
  for mat in REGEX.find_iter(src) {
    let pos = mat.start();
    match src[pos] {
      b'(' => depth += 1,
      b')' if depth == 0 => return Some(pos),
      b')' => depth -= 1,
      _ => {},
    }
  }
  None
}

struct Segment {
  offset: usize,
  row:    usize,
  col:    usize,
}

/// The text a window covers, joined by `\n`, with segment starts.
struct ScanWindow {
  text:     String,
  segments: Vec<Segment>,
}

impl ScanWindow {
  fn new(text: RopeSlice, range: TextRange) -> Self {
    let mut window = ScanWindow {
      text:     String::new(),
      segments: Vec::new(),
    };
    let last_row = range.end.row.min(position::line_count(text).saturating_sub(1));
    for row in range.start.row..=last_row {
      let Some(line) = position::line_text(text, row) else {
        break;
      };
      let start = if row == range.start.row {
        floor_char_boundary(&line, range.start.col)
      } else {
        0
      };
      let end = if row == range.end.row {
        floor_char_boundary(&line, range.end.col)
      } else {
        line.len()
      };
      if !window.segments.is_empty() {
        window.text.push('\n');
      }
      window.segments.push(Segment {
        offset: window.text.len(),
        row,
        col: start,
      });
      if start < end {
        window.text.push_str(&line[start..end]);
      }
    }
    window
  }

  fn position(&self, offset: usize) -> Position {
    let idx = self
      .segments
      .partition_point(|segment| segment.offset <= offset)
      .saturating_sub(1);
    match self.segments.get(idx) {
      Some(segment) => Position::new(segment.row, segment.col + offset - segment.offset),
      None => Position::zero(),
    }
  }

  fn range(&self, start: usize, end: usize) -> TextRange {
    TextRange::new(self.position(start), self.position(end))
  }
}

fn floor_char_boundary(line: &str, col: usize) -> usize {
  let mut col = col.min(line.len());
  while !line.is_char_boundary(col) {
    col -= 1;
  }
  col
}

/// Whitespace runs that span a line break become one space.
fn collapse_value(raw: &str) -> String {
  if !raw.contains('\n') {
    return raw.to_owned();
  }
  let mut value = String::with_capacity(raw.len());
  let mut run = String::new();
  for ch in raw.chars() {
    if ch.is_whitespace() {
      run.push(ch);
      continue;
    }
    if !run.is_empty() {
      if run.contains('\n') {
        value.push(' ');
      } else {
        value.push_str(&run);
      }
      run.clear();
    }
    value.push(ch);
  }
  if run.contains('\n') {
    value.push(' ');
  } else {
    value.push_str(&run);
  }
  value
}

/// Extract every `@tag(value)` inside `range` of `text`.
pub fn extract(text: RopeSlice, range: TextRange, registry: &MetadataRegistry) -> Metadata {
  let mut metadata = Metadata::default();
  if range.start.row == range.end.row
    && position::line_slice(text, range.start.row)
      .is_none_or(|line| !line.chars().any(|ch| ch == '@'))
  {
    return metadata;
  }

  let window = ScanWindow::new(text, range);
  let haystack = window.text.as_bytes();
  let mut consumed = 0;
  for mat in tag_open_regex().find_iter(haystack) {
    if mat.start() < consumed {
      continue;
    }
    let value_start = mat.end();
    let Some(close) = find_closing_paren(&haystack[value_start..]).map(|idx| value_start + idx)
    else {
      continue;
    };
    consumed = close + 1;

    let tag = &window.text[mat.start() + 1..value_start - 1];
    let canonical = registry.canonical(tag);
    let alias_for = (canonical != tag).then(|| canonical.to_owned());
    metadata.push(MetadataEntry {
      tag: tag.to_owned(),
      value: collapse_value(&window.text[value_start..close]),
      range: window.range(mat.start(), close + 1),
      value_range: window.range(value_start, close),
      alias_for,
    });
  }
  metadata
}
