//! Document state: text, version counter, anchors and undo history.
//!
//! Besides plain [`Transaction`]s the document offers the two write
//! primitives the hunk engine is built on:
//!
//! - [`Document::set_lines`] rewrites whole lines and destroys every anchor
//!   on them;
//! - [`Document::set_text`] rewrites a column span and keeps anchors outside
//!   it (and at its edges).
//!
//! Edits accumulate until [`Document::commit`], which records them as one
//! undo step.
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//!
//! use ropey::Rope;
//! use the_todo::{
//!   document::{
//!     Document,
//!     DocumentId,
//!   },
//!   position::Position,
//! };
//!
//! let id = DocumentId::new(NonZeroUsize::new(1).unwrap());
//! let mut doc = Document::new(id, Rope::from("- [ ] milk\n"));
//!
//! doc
//!   .set_text(Position::new(0, 3), Position::new(0, 4), &["x"])
//!   .unwrap();
//! doc.commit().unwrap();
//! assert_eq!(doc.text().to_string(), "- [x] milk\n");
//! ```

use std::{
  borrow::Cow,
  num::NonZeroUsize,
};

use ropey::Rope;
use thiserror::Error;

use crate::{
  Tendril,
  anchor::{
    AnchorId,
    AnchorSet,
    Gravity,
    Invalidation,
  },
  history::{
    History,
    HistoryError,
    HistoryJump,
  },
  position::{
    self,
    Position,
  },
  transaction::{
    ChangeSet,
    Transaction,
    TransactionError,
  },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(NonZeroUsize);

impl DocumentId {
  pub const fn new(id: NonZeroUsize) -> Self {
    Self(id)
  }

  pub const fn get(self) -> NonZeroUsize {
    self.0
  }
}

impl From<NonZeroUsize> for DocumentId {
  fn from(value: NonZeroUsize) -> Self {
    Self::new(value)
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DocumentFlags {
  pub readonly: bool,
  pub modified: bool,
}

#[derive(Debug, Error)]
pub enum DocumentError {
  #[error("document is readonly")]
  Readonly,
  #[error("row {row} is out of bounds for {line_count} lines")]
  RowOutOfBounds { row: usize, line_count: usize },
  #[error("position {pos} is not a valid char boundary in the document")]
  InvalidPosition { pos: Position },
  #[error("start {start} is after end {end}")]
  InvertedRange { start: Position, end: Position },
  #[error(transparent)]
  Transaction(#[from] TransactionError),
  #[error(transparent)]
  History(#[from] HistoryError),
}

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug)]
pub struct Document {
  id:        DocumentId,
  text:      Rope,
  history:   History,
  changes:   ChangeSet,
  old_state: Option<Rope>,
  anchors:   AnchorSet,
  version:   u64,
  flags:     DocumentFlags,
}

impl Document {
  pub fn new(id: DocumentId, text: Rope) -> Self {
    let changes = ChangeSet::new(text.slice(..));
    Self {
      id,
      text,
      history: History::default(),
      changes,
      old_state: None,
      anchors: AnchorSet::default(),
      version: 0,
      flags: DocumentFlags::default(),
    }
  }

  pub fn id(&self) -> DocumentId {
    self.id
  }

  pub fn text(&self) -> &Rope {
    &self.text
  }

  /// Monotonic counter bumped by every applied change, undo and redo
  /// included.
  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn flags(&self) -> DocumentFlags {
    self.flags
  }

  pub fn set_readonly(&mut self, readonly: bool) {
    self.flags.readonly = readonly;
  }

  pub fn history(&self) -> &History {
    &self.history
  }

  pub fn line_count(&self) -> usize {
    position::line_count(self.text.slice(..))
  }

  /// Content of `row` without its line ending.
  pub fn line(&self, row: usize) -> Option<Cow<'_, str>> {
    if row >= self.line_count() {
      return None;
    }
    position::line_text(self.text.slice(..), row)
  }

  /// Lines `[start, end)`, clamped to the document.
  pub fn lines(&self, start: usize, end: usize) -> Vec<String> {
    (start..end.min(self.line_count()))
      .filter_map(|row| self.line(row).map(Cow::into_owned))
      .collect()
  }

  // Anchors.

  pub fn anchors(&self) -> &AnchorSet {
    &self.anchors
  }

  pub fn create_anchor(&mut self, pos: Position, gravity: Gravity) -> Result<AnchorId> {
    let idx = self.char_idx(pos)?;
    Ok(self.anchors.insert(idx, gravity))
  }

  /// Where an anchor currently sits. `None` means the anchor is gone.
  pub fn resolve_anchor(&self, id: AnchorId) -> Option<Position> {
    self
      .anchors
      .get(id)
      .map(|idx| position::position_at_char(self.text.slice(..), idx))
  }

  pub fn delete_anchor(&mut self, id: AnchorId) -> bool {
    self.anchors.remove(id)
  }

  /// Anchors on rows `[start_row, end_row)`, ordered by position.
  pub fn anchors_in_rows(&self, start_row: usize, end_row: usize) -> Vec<(AnchorId, Position)> {
    let text = self.text.slice(..);
    let from = position::row_start_char(text, start_row);
    let to = if end_row >= self.line_count() {
      text.len_chars() + 1
    } else {
      position::row_start_char(text, end_row)
    };
    self
      .anchors
      .in_range(from, to)
      .into_iter()
      .map(|(id, idx)| (id, position::position_at_char(text, idx)))
      .collect()
  }

  fn char_idx(&self, pos: Position) -> Result<usize> {
    let line_count = self.line_count();
    if pos.row >= line_count {
      return Err(DocumentError::RowOutOfBounds {
        row: pos.row,
        line_count,
      });
    }
    position::char_idx_at(self.text.slice(..), pos).ok_or(DocumentError::InvalidPosition { pos })
  }

  // Edits.

  pub fn apply_transaction(&mut self, transaction: &Transaction) -> Result<()> {
    if self.flags.readonly {
      return Err(DocumentError::Readonly);
    }

    if transaction.changes().is_empty() {
      return Ok(());
    }

    if self.old_state.is_none() {
      self.old_state = Some(self.text.clone());
    }

    transaction.apply(&mut self.text)?;
    self.anchors.map(transaction.changes())?;

    let prior = std::mem::take(&mut self.changes);
    self.changes = prior.compose(transaction.changes().clone())?;

    self.flags.modified = true;
    self.version = self.version.saturating_add(1);
    Ok(())
  }

  /// Replace rows `[start_row, end_row)` with `lines`. With
  /// `start_row == end_row` the lines are inserted before `start_row`; with
  /// no lines the rows are deleted. Anchors on replaced rows are removed.
  pub fn set_lines<S: AsRef<str>>(
    &mut self,
    start_row: usize,
    end_row: usize,
    lines: &[S],
  ) -> Result<()> {
    if self.flags.readonly {
      return Err(DocumentError::Readonly);
    }
    let line_count = self.line_count();
    if start_row > end_row || end_row > line_count {
      return Err(DocumentError::RowOutOfBounds {
        row: end_row.max(start_row),
        line_count,
      });
    }

    let text = self.text.slice(..);
    let len = text.len_chars();
    let mut from = position::row_start_char(text, start_row);
    let to = if end_row >= line_count {
      len
    } else {
      position::row_start_char(text, end_row)
    };
    let invalidated_to = if to == len { len + 1 } else { to };

    let mut replacement = String::new();
    for line in lines {
      replacement.push_str(line.as_ref());
      replacement.push('\n');
    }

    // The last line has no break to replace: keep the document's shape.
    if to == len && len > 0 && !position::ends_with_line_ending(text) {
      if start_row == end_row {
        replacement.pop();
        replacement.insert(0, '\n');
      } else if lines.is_empty() {
        from = from.saturating_sub(preceding_break_len(&self.text, from));
      } else {
        replacement.pop();
      }
    }

    if start_row < end_row {
      self.anchors.invalidate(from, invalidated_to, Invalidation::Lines);
    }
    let tendril = (!replacement.is_empty()).then(|| Tendril::from(replacement.as_str()));
    let tx = Transaction::change(&self.text, [(from, to, tendril)])?;
    self.apply_transaction(&tx)
  }

  /// Replace the span `[start, end)` with `lines` joined by line breaks.
  /// Anchors strictly inside the span are removed; anchors at its edges and
  /// elsewhere on the affected lines survive.
  pub fn set_text<S: AsRef<str>>(&mut self, start: Position, end: Position, lines: &[S]) -> Result<()> {
    if self.flags.readonly {
      return Err(DocumentError::Readonly);
    }
    if start > end {
      return Err(DocumentError::InvertedRange { start, end });
    }
    let from = self.char_idx(start)?;
    let to = self.char_idx(end)?;

    let replacement = lines
      .iter()
      .map(AsRef::as_ref)
      .collect::<Vec<&str>>()
      .join("\n");

    self.anchors.invalidate(from, to, Invalidation::Span);
    let tendril = (!replacement.is_empty()).then(|| Tendril::from(replacement.as_str()));
    let tx = Transaction::change(&self.text, [(from, to, tendril)])?;
    self.apply_transaction(&tx)
  }

  /// Close the current undo step. Everything applied since the previous
  /// commit undoes as one unit.
  pub fn commit(&mut self) -> Result<()> {
    let Some(original) = self.old_state.take() else {
      return Ok(());
    };
    if self.changes.is_empty() {
      return Ok(());
    }

    let tx = Transaction::from(std::mem::replace(
      &mut self.changes,
      ChangeSet::new(self.text.slice(..)),
    ));
    self.history.commit_revision(&tx, &original)?;
    Ok(())
  }

  pub fn undo(&mut self) -> Result<bool> {
    self.commit()?;
    let Some(jump) = self.history.undo() else {
      return Ok(false);
    };
    self.apply_history_jump(&jump)?;
    self.history.apply_jump(&jump)?;
    Ok(true)
  }

  pub fn redo(&mut self) -> Result<bool> {
    self.commit()?;
    let Some(jump) = self.history.redo() else {
      return Ok(false);
    };
    self.apply_history_jump(&jump)?;
    self.history.apply_jump(&jump)?;
    Ok(true)
  }

  fn apply_history_jump(&mut self, jump: &HistoryJump) -> Result<()> {
    for txn in &jump.transactions {
      txn.apply(&mut self.text)?;
      self.anchors.map(txn.changes())?;
    }

    self.changes = ChangeSet::new(self.text.slice(..));
    self.old_state = None;
    self.version = self.version.saturating_add(1);
    Ok(())
  }
}

/// Length in chars of the line break ending right before char `idx`.
fn preceding_break_len(text: &Rope, idx: usize) -> usize {
  match (
    idx.checked_sub(2).map(|i| text.char(i)),
    idx.checked_sub(1).map(|i| text.char(i)),
  ) {
    (Some('\r'), Some('\n')) => 2,
    (_, Some('\n' | '\r')) => 1,
    _ => 0,
  }
}
