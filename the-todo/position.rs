//! Row/column coordinates over a rope.
//!
//! Columns are **byte** offsets within a line, the unit tree providers and
//! the metadata scanner report. The rope and [`ChangeSet`] operate on char
//! indices, so every write goes through [`char_idx_at`] first.
//!
//! [`ChangeSet`]: crate::transaction::ChangeSet

use std::{
  borrow::Cow,
  fmt,
};

use ropey::RopeSlice;
use serde::{
  Deserialize,
  Serialize,
};

/// This is a single point in a text buffer.
/// 0-indexed as all things should be.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
  pub row: usize,
  pub col: usize,
}

impl Position {
  pub const fn new(row: usize, col: usize) -> Self {
    Self { row, col }
  }

  pub const fn zero() -> Self {
    Self { row: 0, col: 0 }
  }

  pub const fn is_zero(&self) -> bool {
    self.row == 0 && self.col == 0
  }
}

impl From<(usize, usize)> for Position {
  fn from(value: (usize, usize)) -> Self {
    Position::new(value.0, value.1)
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.row, self.col)
  }
}

/// Half-open span between two positions, as syntax trees report them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
  pub start: Position,
  pub end:   Position,
}

impl TextRange {
  pub const fn new(start: Position, end: Position) -> Self {
    Self { start, end }
  }

  pub fn is_empty(&self) -> bool {
    self.start >= self.end
  }

  /// Whether `pos` lies in `[start, end)`.
  pub fn contains(&self, pos: Position) -> bool {
    self.start <= pos && pos < self.end
  }

  pub fn overlaps(&self, other: &TextRange) -> bool {
    self.start < other.end && other.start < self.end
  }
}

/// Number of chars the line ending at the tail of `line` occupies.
fn line_ending_len(line: RopeSlice) -> usize {
  let len = line.len_chars();
  match (
    len.checked_sub(2).map(|idx| line.char(idx)),
    len.checked_sub(1).map(|idx| line.char(idx)),
  ) {
    (Some('\r'), Some('\n')) => 2,
    (_, Some('\n' | '\r')) => 1,
    _ => 0,
  }
}

/// Whether the text ends in a line break, i.e. the rope's last line is the
/// empty remainder after it.
pub fn ends_with_line_ending(text: RopeSlice) -> bool {
  matches!(
    text.len_chars().checked_sub(1).map(|idx| text.char(idx)),
    Some('\n' | '\r')
  )
}

/// Number of lines as an editor shows them: the empty remainder after a
/// trailing line break is not a line of its own. An empty text has one
/// (empty) line.
pub fn line_count(text: RopeSlice) -> usize {
  let lines = text.len_lines();
  if lines > 1 && ends_with_line_ending(text) {
    lines - 1
  } else {
    lines
  }
}

/// The content of `row` without its line ending.
pub fn line_slice<'a>(text: RopeSlice<'a>, row: usize) -> Option<RopeSlice<'a>> {
  if row >= text.len_lines() {
    return None;
  }
  let line = text.line(row);
  let ending = line_ending_len(line);
  Some(line.slice(..line.len_chars() - ending))
}

pub fn line_text<'a>(text: RopeSlice<'a>, row: usize) -> Option<Cow<'a, str>> {
  line_slice(text, row).map(Cow::from)
}

/// Char index of the first char of `row`. Rows past the end clamp to the end
/// of the text.
pub fn row_start_char(text: RopeSlice, row: usize) -> usize {
  if row >= text.len_lines() {
    text.len_chars()
  } else {
    text.line_to_char(row)
  }
}

/// Convert a `(row, byte column)` into a char index.
///
/// Returns `None` when the row does not exist, the column lies past the line
/// content, or the column splits a multi-byte char.
pub fn char_idx_at(text: RopeSlice, pos: Position) -> Option<usize> {
  let line = line_slice(text, pos.row)?;
  if pos.col > line.len_bytes() {
    return None;
  }
  let char_in_line = line.byte_to_char(pos.col);
  if line.char_to_byte(char_in_line) != pos.col {
    return None;
  }
  Some(text.line_to_char(pos.row) + char_in_line)
}

/// Converts a char index into a `Position` with a byte column.
pub fn position_at_char(text: RopeSlice, char_idx: usize) -> Position {
  let char_idx = char_idx.min(text.len_chars());
  let row = text.char_to_line(char_idx);
  let line_start = text.line_to_byte(row);
  Position::new(row, text.char_to_byte(char_idx) - line_start)
}

/// Converts a byte offset into a `Position`.
pub fn position_at_byte(text: RopeSlice, byte_idx: usize) -> Position {
  let byte_idx = byte_idx.min(text.len_bytes());
  let row = text.byte_to_line(byte_idx);
  Position::new(row, byte_idx - text.line_to_byte(row))
}

#[cfg(test)]
mod tests {
  use ropey::Rope;

  use super::*;

  #[test]
  fn line_count_ignores_trailing_break() {
    assert_eq!(line_count(Rope::from("").slice(..)), 1);
    assert_eq!(line_count(Rope::from("a").slice(..)), 1);
    assert_eq!(line_count(Rope::from("a\n").slice(..)), 1);
    assert_eq!(line_count(Rope::from("a\nb").slice(..)), 2);
    assert_eq!(line_count(Rope::from("a\r\nb\r\n").slice(..)), 2);
  }

  #[test]
  fn line_text_strips_endings() {
    let text = Rope::from("one\r\ntwo\nthree");
    assert_eq!(line_text(text.slice(..), 0).unwrap(), "one");
    assert_eq!(line_text(text.slice(..), 1).unwrap(), "two");
    assert_eq!(line_text(text.slice(..), 2).unwrap(), "three");
    assert!(line_text(text.slice(..), 3).is_none());
  }

  #[test]
  fn byte_columns_round_trip_through_chars() {
    let text = Rope::from("- □ milk\n  ✔ done\n");
    let slice = text.slice(..);
    // "□" is three bytes wide.
    let idx = char_idx_at(slice, Position::new(0, 5)).unwrap();
    assert_eq!(idx, 3);
    assert_eq!(position_at_char(slice, idx), Position::new(0, 5));
    // Column inside a multi-byte char is rejected.
    assert!(char_idx_at(slice, Position::new(0, 3)).is_none());
    // Column past the line content is rejected.
    assert!(char_idx_at(slice, Position::new(1, 20)).is_none());
    assert_eq!(position_at_byte(slice, 13), Position::new(1, 2));
  }
}
