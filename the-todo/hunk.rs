//! Batched, anchor-aware document mutation.
//!
//! A [`Hunk`] is one edit expressed in document coordinates. Whole-line
//! hunks rewrite entire lines and take every anchor on them along; text
//! hunks rewrite a column span and leave anchors at its edges in place, so
//! an item marker survives a text hunk on its own line.
//!
//! [`apply_diff`] drops no-op and malformed hunks, applies the rest from the
//! bottom of the document up so earlier positions stay valid, and records
//! the whole batch as one undo step. Overlapping hunks are not detected.

use thiserror::Error;
use tracing::debug;

use crate::{
  document::{
    self,
    Document,
  },
  position::{
    self,
    Position,
  },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HunkKind {
  /// Insert lines before `start.row`.
  LineInsert,
  /// Replace rows `[start.row, end.row)`; no content deletes them.
  LineReplace,
  TextReplace,
  TextInsert,
  TextDelete,
}

impl HunkKind {
  pub const fn is_whole_line(self) -> bool {
    matches!(self, HunkKind::LineInsert | HunkKind::LineReplace)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
  pub start:   Position,
  pub end:     Position,
  pub content: Vec<String>,
  pub kind:    HunkKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HunkError {
  #[error("hunk start {start} is after its end {end}")]
  Inverted { start: Position, end: Position },
  #[error("row {row} is outside the document")]
  RowOutOfBounds { row: usize },
  #[error("position {pos} is not on a char boundary inside its line")]
  InvalidColumn { pos: Position },
  #[error("{kind:?} hunk has an inconsistent shape")]
  Shape { kind: HunkKind },
}

/// How many hunks of a batch ran.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffOutcome {
  pub applied: usize,
  pub skipped: usize,
}

fn lines<I, S>(content: I) -> Vec<String>
where
  I: IntoIterator<Item = S>,
  S: Into<String>,
{
  content.into_iter().map(Into::into).collect()
}

impl Hunk {
  pub fn insert_lines<I, S>(row: usize, content: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let at = Position::new(row, 0);
    Self {
      start:   at,
      end:     at,
      content: lines(content),
      kind:    HunkKind::LineInsert,
    }
  }

  pub fn replace_lines<I, S>(start_row: usize, end_row: usize, content: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      start:   Position::new(start_row, 0),
      end:     Position::new(end_row, 0),
      content: lines(content),
      kind:    HunkKind::LineReplace,
    }
  }

  pub fn delete_lines(start_row: usize, end_row: usize) -> Self {
    Self::replace_lines(start_row, end_row, Vec::<String>::new())
  }

  pub fn replace_text<I, S>(start: Position, end: Position, content: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      start,
      end,
      content: lines(content),
      kind: HunkKind::TextReplace,
    }
  }

  pub fn insert_text<I, S>(at: Position, content: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      start:   at,
      end:     at,
      content: lines(content),
      kind:    HunkKind::TextInsert,
    }
  }

  pub fn delete_text(start: Position, end: Position) -> Self {
    Self {
      start,
      end,
      content: Vec::new(),
      kind: HunkKind::TextDelete,
    }
  }

  /// A zero-length delete or the insertion of a single empty line at a
  /// point changes nothing.
  pub fn is_empty(&self) -> bool {
    self.start == self.end
      && match self.content.as_slice() {
        [] => true,
        [line] => line.is_empty(),
        _ => false,
      }
  }

  /// Check the hunk against the current document.
  pub fn validate(&self, doc: &Document) -> Result<(), HunkError> {
    if self.start > self.end {
      return Err(HunkError::Inverted {
        start: self.start,
        end:   self.end,
      });
    }
    let shape = HunkError::Shape { kind: self.kind };
    let line_count = doc.line_count();

    if self.kind.is_whole_line() {
      if self.start.col != 0 || self.end.col != 0 {
        return Err(shape);
      }
      if self.kind == HunkKind::LineInsert && self.start != self.end {
        return Err(shape);
      }
      if self.end.row > line_count {
        return Err(HunkError::RowOutOfBounds { row: self.end.row });
      }
      return Ok(());
    }

    match self.kind {
      HunkKind::TextInsert if self.start != self.end => return Err(shape),
      HunkKind::TextDelete if !self.content.is_empty() => return Err(shape),
      _ => {},
    }
    for pos in [self.start, self.end] {
      if pos.row >= line_count {
        return Err(HunkError::RowOutOfBounds { row: pos.row });
      }
      if position::char_idx_at(doc.text().slice(..), pos).is_none() {
        return Err(HunkError::InvalidColumn { pos });
      }
    }
    Ok(())
  }

  fn apply(&self, doc: &mut Document) -> document::Result<()> {
    match self.kind {
      HunkKind::LineInsert => doc.set_lines(self.start.row, self.start.row, &self.content),
      HunkKind::LineReplace => doc.set_lines(self.start.row, self.end.row, &self.content),
      HunkKind::TextReplace | HunkKind::TextInsert | HunkKind::TextDelete => {
        doc.set_text(self.start, self.end, &self.content)
      },
    }
  }
}

/// Drop no-op and invalid hunks and order the rest bottom-up by start
/// position. Hunks sharing a start keep their relative order.
pub fn prepare(doc: &Document, hunks: impl IntoIterator<Item = Hunk>) -> (Vec<Hunk>, usize) {
  let mut skipped = 0;
  let mut ready: Vec<Hunk> = hunks
    .into_iter()
    .filter(|hunk| {
      if hunk.is_empty() {
        debug!(?hunk, "skipping no-op hunk");
        skipped += 1;
        return false;
      }
      if let Err(err) = hunk.validate(doc) {
        debug!(?hunk, "skipping malformed hunk: {err}");
        skipped += 1;
        return false;
      }
      true
    })
    .collect();
  ready.sort_by(|a, b| b.start.cmp(&a.start));
  (ready, skipped)
}

/// Apply a batch of hunks as one undo step.
///
/// Edits already pending on the document are committed first, so undoing
/// afterwards reverts exactly this batch.
pub fn apply_diff(
  doc: &mut Document,
  hunks: impl IntoIterator<Item = Hunk>,
) -> document::Result<DiffOutcome> {
  let (ready, skipped) = prepare(doc, hunks);
  let mut outcome = DiffOutcome {
    applied: 0,
    skipped,
  };
  if ready.is_empty() {
    return Ok(outcome);
  }

  doc.commit()?;
  let result: document::Result<()> = ready.iter().try_for_each(|hunk| {
    hunk.apply(doc)?;
    outcome.applied += 1;
    Ok(())
  });
  doc.commit()?;
  result.map(|()| outcome)
}

#[cfg(test)]
mod tests {
  use std::num::NonZeroUsize;

  use quickcheck::{
    Arbitrary,
    Gen,
  };
  use ropey::Rope;

  use super::*;
  use crate::document::DocumentId;

  fn doc(text: &str) -> Document {
    Document::new(DocumentId::new(NonZeroUsize::MIN), Rope::from(text))
  }

  fn numbered(lines: usize) -> Document {
    doc(
      &(0..lines)
        .map(|row| format!("line {row}\n"))
        .collect::<String>(),
    )
  }

  #[test]
  fn hunks_apply_bottom_up() {
    let doc = numbered(10);
    let hunks = [5, 2, 8].map(|row| Hunk::insert_text(Position::new(row, 0), ["> "]));
    let (ready, skipped) = prepare(&doc, hunks);

    assert_eq!(skipped, 0);
    let rows: Vec<_> = ready.iter().map(|hunk| hunk.start.row).collect();
    assert_eq!(rows, vec![8, 5, 2]);
  }

  #[test]
  fn no_op_hunks_are_never_applied() {
    let mut doc = numbered(2);
    let at = Position::new(0, 2);
    let outcome = apply_diff(&mut doc, [
      Hunk::delete_text(at, at),
      Hunk::insert_text(at, [""]),
      Hunk::delete_lines(1, 1),
    ])
    .unwrap();

    assert_eq!(outcome, DiffOutcome {
      applied: 0,
      skipped: 3,
    });
    assert_eq!(doc.version(), 0);
    assert!(doc.history().is_empty());
  }

  #[test]
  fn malformed_hunks_are_filtered() {
    let doc = doc("- [ ] é\n");
    let bad = [
      Hunk::replace_text(Position::new(0, 4), Position::new(0, 2), ["x"]),
      Hunk::insert_text(Position::new(3, 0), ["x"]),
      Hunk::insert_text(Position::new(0, 7), ["x"]),
      Hunk::insert_text(Position::new(0, 20), ["x"]),
      Hunk::replace_lines(0, 2, ["x"]),
      Hunk {
        start:   Position::new(0, 0),
        end:     Position::new(0, 3),
        content: vec!["x".into()],
        kind:    HunkKind::TextDelete,
      },
      Hunk {
        start:   Position::new(0, 1),
        end:     Position::new(0, 1),
        content: vec!["x".into()],
        kind:    HunkKind::LineInsert,
      },
    ];
    for hunk in &bad {
      assert!(hunk.validate(&doc).is_err(), "{hunk:?} should be invalid");
    }
    let (ready, skipped) = prepare(&doc, bad);
    assert!(ready.is_empty());
    assert_eq!(skipped, 7);

    assert!(Hunk::insert_text(Position::new(0, 6), ["x"]).validate(&doc).is_ok());
    assert!(Hunk::insert_lines(1, ["x"]).validate(&doc).is_ok());
  }

  #[test]
  fn mixed_batch_edits_in_original_coordinates() {
    let mut doc = doc("- [ ] a\n- [ ] b\n- [ ] c\n");
    let outcome = apply_diff(&mut doc, [
      Hunk::replace_text(Position::new(0, 2), Position::new(0, 5), ["[x]"]),
      Hunk::insert_lines(1, ["  - [ ] a.1"]),
      Hunk::delete_lines(2, 3),
      Hunk::insert_text(Position::new(1, 7), [" @p(high)"]),
    ])
    .unwrap();

    assert_eq!(outcome.applied, 4);
    assert_eq!(
      doc.text().to_string(),
      "- [x] a\n  - [ ] a.1\n- [ ] b @p(high)\n"
    );
  }

  #[test]
  fn one_undo_reverts_the_whole_batch() {
    let original = "- [ ] a\n- [ ] b\n";
    let mut doc = doc(original);
    doc.set_lines(2, 2, &["- [ ] c"]).unwrap();

    apply_diff(&mut doc, [
      Hunk::replace_text(Position::new(0, 3), Position::new(0, 4), ["x"]),
      Hunk::replace_text(Position::new(1, 3), Position::new(1, 4), ["x"]),
      Hunk::insert_lines(0, ["# todo"]),
    ])
    .unwrap();
    assert_eq!(doc.text().to_string(), "# todo\n- [x] a\n- [x] b\n- [ ] c\n");

    assert!(doc.undo().unwrap());
    assert_eq!(doc.text().to_string(), "- [ ] a\n- [ ] b\n- [ ] c\n");
    assert!(doc.undo().unwrap());
    assert_eq!(doc.text().to_string(), original);
  }

  #[test]
  fn readonly_documents_report_errors() {
    let mut doc = doc("a\n");
    doc.set_readonly(true);
    assert!(apply_diff(&mut doc, [Hunk::insert_lines(0, ["b"])]).is_err());
    assert_eq!(doc.text().to_string(), "a\n");
  }

  #[derive(Debug, Clone)]
  struct Starts(Vec<(usize, usize)>);

  impl Arbitrary for Starts {
    fn arbitrary(g: &mut Gen) -> Self {
      let len = usize::arbitrary(g) % 16;
      Starts(
        (0..len)
          .map(|_| (usize::arbitrary(g) % 10, usize::arbitrary(g) % 7))
          .collect(),
      )
    }
  }

  quickcheck::quickcheck! {
    fn prepared_hunks_never_move_up(starts: Starts) -> bool {
      let doc = numbered(10);
      let hunks = starts
        .0
        .iter()
        .map(|&(row, col)| Hunk::insert_text(Position::new(row, col), ["x"]));
      let (ready, skipped) = prepare(&doc, hunks);

      skipped == 0
        && ready.len() == starts.0.len()
        && ready.windows(2).all(|pair| pair[0].start >= pair[1].start)
    }
  }
}
