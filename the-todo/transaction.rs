//! Change-set primitives for document editing.
//!
//! A [`ChangeSet`] is a sequence of [`Operation`]s applied from the start of
//! the document:
//!
//! - **Retain(n)** - Keep `n` characters unchanged
//! - **Delete(n)** - Remove `n` characters
//! - **Insert(s)** - Insert string `s`
//!
//! [`Transaction`] wraps a change set with the constructors callers use.
//! Anchors are moved through applied changes with
//! [`ChangeSet::update_positions`], where [`Assoc`] decides on which side of
//! an insertion at exactly the anchor's point it ends up.
//!
//! ```ignore
//! use the_todo::transaction::{Assoc, Transaction};
//! use ropey::Rope;
//!
//! let mut doc = Rope::from("- [ ] milk");
//! let tx = Transaction::change(&doc, vec![(2, 2, Some("! ".into()))]).unwrap();
//!
//! assert_eq!(tx.changes().map_pos(2, Assoc::Before).unwrap(), 2);
//! assert_eq!(tx.changes().map_pos(2, Assoc::After).unwrap(), 4);
//!
//! tx.apply(&mut doc).unwrap();
//! assert_eq!(doc.to_string(), "- ! [ ] milk");
//! ```

use std::{
  borrow::Cow,
  cmp::Ordering,
  iter::once,
};

use ropey::{
  Rope,
  RopeSlice,
};
use thiserror::Error;

use crate::Tendril;

pub type Result<T> = std::result::Result<T, TransactionError>;

/// (from, to) replacement.
pub type Change = (usize, usize, Option<Tendril>);

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransactionError {
  #[error("changeset length mismatch: expected {expected}, got {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error(
    "changeset compose length mismatch: left output {left_len_after}, right input {right_len}"
  )]
  ComposeLengthMismatch {
    left_len_after: usize,
    right_len:      usize,
  },
  #[error("invalid change range: start {from} is after end {to}")]
  InvalidRange { from: usize, to: usize },
  #[error("change range {from}..{to} is out of bounds for document length {len}")]
  RangeOutOfBounds {
    from: usize,
    to:   usize,
    len:  usize,
  },
  #[error("change range {from}..{to} overlaps previous end {prev_end}")]
  OverlappingRange {
    prev_end: usize,
    from:     usize,
    to:       usize,
  },
  #[error("positions {positions:?} are out of bounds for changeset length {len}")]
  PositionsOutOfBounds {
    positions: Vec<usize>,
    len:       usize,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
  /// Move cursor by n characters.
  Retain(usize),

  /// Delete n characters.
  Delete(usize),

  /// Insert text at position.
  Insert(Tendril),
}

/// Which side of an insertion made exactly at a tracked point the point
/// ends up on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assoc {
  /// Stay in front of text inserted at the point.
  Before,
  /// Move past text inserted at the point.
  After,
}

impl Assoc {
  fn insert_offset(self, inserted_chars: usize) -> usize {
    match self {
      Assoc::Before => 0,
      Assoc::After => inserted_chars,
    }
  }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
  pub(crate) changes: Vec<Operation>,
  /// The required document length. Will refuse to apply changes unless it
  /// matches.
  len:                usize,
  len_after:          usize,
}

impl ChangeSet {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      changes:   Vec::with_capacity(capacity),
      len:       0,
      len_after: 0,
    }
  }

  #[must_use]
  pub fn new(doc: RopeSlice) -> Self {
    let len = doc.len_chars();
    Self {
      changes: Vec::new(),
      len,
      len_after: len,
    }
  }

  pub fn changes(&self) -> &[Operation] {
    &self.changes
  }

  /// Returns the expected document length for this changeset
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn len_after(&self) -> usize {
    self.len_after
  }

  pub fn delete(&mut self, n: usize) {
    use Operation::*;

    if n == 0 {
      return;
    }

    self.len += n;

    if let Some(Delete(count)) = self.changes.last_mut() {
      *count += n;
    } else {
      self.changes.push(Delete(n))
    }
  }

  pub fn insert(&mut self, fragment: Tendril) {
    use Operation::*;

    if fragment.is_empty() {
      return;
    }

    self.len_after += fragment.chars().count();

    let new_last = match self.changes.as_mut_slice() {
      [.., Insert(prev)] | [.., Insert(prev), Delete(_)] => {
        prev.push_str(&fragment);
        return;
      },
      [.., last @ Delete(_)] => std::mem::replace(last, Insert(fragment)),
      _ => Insert(fragment),
    };

    self.changes.push(new_last);
  }

  pub fn retain(&mut self, n: usize) {
    use Operation::*;

    if n == 0 {
      return;
    }

    self.len += n;
    self.len_after += n;

    if let Some(Retain(count)) = self.changes.last_mut() {
      *count += n;
    } else {
      self.changes.push(Retain(n))
    }
  }

  /// Combine two `ChangeSet` together. Applying the result is equivalent to
  /// applying `self` and then `other`.
  pub fn compose(self, other: Self) -> Result<Self> {
    if self.len_after != other.len {
      return Err(TransactionError::ComposeLengthMismatch {
        left_len_after: self.len_after,
        right_len:      other.len,
      });
    }

    if self.changes.is_empty() {
      return Ok(other);
    }
    if other.changes.is_empty() {
      return Ok(self);
    }

    let mut changes_a = self.changes.into_iter();
    let mut changes_b = other.changes.into_iter();

    let mut head_a = changes_a.next();
    let mut head_b = changes_b.next();

    let mut changes = Self::with_capacity(changes_a.len() + changes_b.len() + 2);

    loop {
      use Operation::*;
      match (head_a, head_b) {
        (None, None) => break,
        (Some(Delete(i)), b) => {
          changes.delete(i);
          head_a = changes_a.next();
          head_b = b;
        },
        (a, Some(Insert(current))) => {
          changes.insert(current);
          head_a = a;
          head_b = changes_b.next();
        },
        (None, val) | (val, None) => unreachable!("({:?})", val),
        (Some(Retain(i)), Some(Retain(j))) => match i.cmp(&j) {
          Ordering::Less => {
            changes.retain(i);
            head_a = changes_a.next();
            head_b = Some(Retain(j - i));
          },
          Ordering::Equal => {
            changes.retain(i);
            head_a = changes_a.next();
            head_b = changes_b.next();
          },
          Ordering::Greater => {
            changes.retain(j);
            head_a = Some(Retain(i - j));
            head_b = changes_b.next();
          },
        },
        (Some(Insert(mut s)), Some(Delete(j))) => {
          let len = s.chars().count();
          match len.cmp(&j) {
            Ordering::Less => {
              head_a = changes_a.next();
              head_b = Some(Delete(j - len));
            },
            Ordering::Equal => {
              head_a = changes_a.next();
              head_b = changes_b.next();
            },
            Ordering::Greater => {
              let pos = byte_offset_of_char(&s, j);
              s.replace_range(0..pos, "");
              head_a = Some(Insert(s));
              head_b = changes_b.next();
            },
          }
        },
        (Some(Insert(s)), Some(Retain(j))) => {
          let len = s.chars().count();
          match len.cmp(&j) {
            Ordering::Less => {
              changes.insert(s);
              head_a = changes_a.next();
              head_b = Some(Retain(j - len));
            },
            Ordering::Equal => {
              changes.insert(s);
              head_a = changes_a.next();
              head_b = changes_b.next();
            },
            Ordering::Greater => {
              let pos = byte_offset_of_char(&s, j);
              let mut before = s;
              let after = before.split_off(pos);

              changes.insert(before);
              head_a = Some(Insert(after));
              head_b = changes_b.next();
            },
          }
        },
        (Some(Retain(i)), Some(Delete(j))) => match i.cmp(&j) {
          Ordering::Less => {
            changes.delete(i);
            head_a = changes_a.next();
            head_b = Some(Delete(j - i));
          },
          Ordering::Equal => {
            changes.delete(j);
            head_a = changes_a.next();
            head_b = changes_b.next();
          },
          Ordering::Greater => {
            changes.delete(j);
            head_a = Some(Retain(i - j));
            head_b = changes_b.next();
          },
        },
      };
    }

    debug_assert!(changes.len == self.len);

    Ok(changes)
  }

  /// Returns a new changeset that reverts this one. The document parameter
  /// expects the original document before this change was applied.
  pub fn invert(&self, original_doc: &Rope) -> Result<Self> {
    if self.changes.is_empty() {
      return Ok(ChangeSet {
        changes:   Vec::new(),
        len:       self.len_after,
        len_after: self.len,
      });
    }

    self.ensure_len(original_doc.len_chars())?;

    let mut changes = Self::with_capacity(self.changes.len());
    let mut pos = 0;

    for change in &self.changes {
      use Operation::*;
      match change {
        Retain(n) => {
          changes.retain(*n);
          pos += n;
        },
        Delete(n) => {
          let text = Cow::from(original_doc.slice(pos..pos + *n));
          changes.insert(Tendril::from(text.as_ref()));
          pos += n;
        },
        Insert(s) => changes.delete(s.chars().count()),
      }
    }

    Ok(changes)
  }

  fn ensure_len(&self, text_len: usize) -> Result<()> {
    if text_len != self.len {
      return Err(TransactionError::LengthMismatch {
        expected: self.len,
        actual:   text_len,
      });
    }
    Ok(())
  }

  /// Apply this changeset in-place.
  pub fn apply(&self, text: &mut Rope) -> Result<()> {
    self.ensure_len(text.len_chars())?;
    let mut pos = 0;

    for change in &self.changes {
      use Operation::*;
      match change {
        Retain(n) => pos += n,
        Delete(n) => text.remove(pos..pos + *n),
        Insert(s) => {
          text.insert(pos, s);
          pos += s.chars().count();
        },
      }
    }

    Ok(())
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.changes.is_empty() || self.changes == [Operation::Retain(self.len)]
  }

  /// Map positions (char indices in the old document) through the changes.
  ///
  /// Positions inside a deleted span collapse onto the deletion point. A
  /// position exactly at an insertion point is placed by its [`Assoc`]; at
  /// the start of a replacement it stays in front of the new text.
  /// Positions may be given in any order.
  pub fn update_positions<'a>(
    &self,
    positions: impl Iterator<Item = (&'a mut usize, Assoc)>,
  ) -> Result<()> {
    use Operation::*;

    let mut positions: Vec<_> = positions.collect();
    if self.changes.is_empty() {
      let out_of_bounds: Vec<usize> = positions
        .iter()
        .map(|(pos, _)| **pos)
        .filter(|pos| *pos > self.len)
        .collect();
      return if out_of_bounds.is_empty() {
        Ok(())
      } else {
        Err(TransactionError::PositionsOutOfBounds {
          positions: out_of_bounds,
          len:       self.len,
        })
      };
    }
    positions.sort_by_key(|(pos, _)| **pos);
    let mut positions = positions.into_iter().peekable();

    let mut old_pos = 0;
    let mut new_pos = 0;
    let mut ops = self.changes.iter().peekable();

    while let Some(op) = ops.next() {
      match op {
        Retain(n) => {
          let old_end = old_pos + n;
          while let Some((pos, _)) = positions.next_if(|(pos, _)| **pos < old_end) {
            *pos = new_pos + (*pos - old_pos);
          }
          old_pos = old_end;
          new_pos += n;
        },
        Delete(n) => {
          let old_end = old_pos + n;
          while let Some((pos, _)) = positions.next_if(|(pos, _)| **pos < old_end) {
            *pos = new_pos;
          }
          old_pos = old_end;
        },
        Insert(s) => {
          let inserted = s.chars().count();
          // a subsequent delete means a replace, consume it
          if let Some(Delete(n)) = ops.peek() {
            ops.next();
            let old_end = old_pos + n;
            while let Some((pos, assoc)) = positions.next_if(|(pos, _)| **pos < old_end) {
              *pos = if *pos == old_pos {
                new_pos
              } else {
                new_pos + assoc.insert_offset(inserted)
              };
            }
            old_pos = old_end;
          } else {
            while let Some((pos, assoc)) = positions.next_if(|(pos, _)| **pos == old_pos) {
              *pos = new_pos + assoc.insert_offset(inserted);
            }
          }
          new_pos += inserted;
        },
      }
    }

    while let Some((pos, _)) = positions.next_if(|(pos, _)| **pos == old_pos) {
      *pos = new_pos;
    }

    let out_of_bounds: Vec<usize> = positions.map(|(pos, _)| *pos).collect();
    if out_of_bounds.is_empty() {
      Ok(())
    } else {
      Err(TransactionError::PositionsOutOfBounds {
        positions: out_of_bounds,
        len:       self.len,
      })
    }
  }

  /// Map a single position through the changes.
  pub fn map_pos(&self, mut pos: usize, assoc: Assoc) -> Result<usize> {
    self.update_positions(once((&mut pos, assoc)))?;
    Ok(pos)
  }
}

fn byte_offset_of_char(s: &str, char_idx: usize) -> usize {
  s.char_indices()
    .nth(char_idx)
    .map_or(s.len(), |(offset, _)| offset)
}

fn validate_change_bounds(from: usize, to: usize, len: usize) -> Result<()> {
  if from > to {
    return Err(TransactionError::InvalidRange { from, to });
  }
  if to > len {
    return Err(TransactionError::RangeOutOfBounds { from, to, len });
  }
  Ok(())
}

impl From<ChangeSet> for Transaction {
  fn from(changes: ChangeSet) -> Self {
    Self { changes }
  }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transaction {
  changes: ChangeSet,
}

impl Transaction {
  pub fn new(doc: &Rope) -> Self {
    Self {
      changes: ChangeSet::new(doc.slice(..)),
    }
  }

  /// Changes made to the buffer.
  pub fn changes(&self) -> &ChangeSet {
    &self.changes
  }

  /// Apply this transaction in-place.
  pub fn apply(&self, doc: &mut Rope) -> Result<()> {
    self.changes.apply(doc)
  }

  /// Generate a transaction that reverts this one.
  pub fn invert(&self, original: &Rope) -> Result<Self> {
    Ok(Self {
      changes: self.changes.invert(original)?,
    })
  }

  pub fn compose(mut self, other: Self) -> Result<Self> {
    self.changes = self.changes.compose(other.changes)?;
    Ok(self)
  }

  /// Generate a transaction from a set of sorted, non-overlapping changes.
  pub fn change<I>(doc: &Rope, changes: I) -> Result<Self>
  where
    I: IntoIterator<Item = Change>,
  {
    let len = doc.len_chars();
    let changes = changes.into_iter();
    let (lower, upper) = changes.size_hint();
    let size = upper.unwrap_or(lower);
    let mut changeset = ChangeSet::with_capacity(2 * size + 1); // rough estimate

    let mut last = 0;
    for (from, to, tendril) in changes {
      validate_change_bounds(from, to, len)?;
      if from < last {
        return Err(TransactionError::OverlappingRange {
          prev_end: last,
          from,
          to,
        });
      }

      changeset.retain(from - last);
      let span = to - from;
      match tendril {
        Some(text) => {
          changeset.insert(text);
          changeset.delete(span);
        },
        None => changeset.delete(span),
      }
      last = to;
    }

    changeset.retain(len - last);

    Ok(Self::from(changeset))
  }
}
