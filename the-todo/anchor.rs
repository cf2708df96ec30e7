//! Edit-surviving position markers.
//!
//! An anchor is a zero-width point stored as a char index into the document
//! rope. Every change applied to the document is mapped through
//! [`AnchorSet::map`], so anchors follow the text they were placed next to.
//! [`Gravity`] decides the outcome for text inserted exactly at the point.
//!
//! Anchors are only ever *removed* explicitly: by [`AnchorSet::remove`], or
//! by the document's whole-line and column-span write primitives through
//! [`AnchorSet::invalidate`]. Plain edits collapse anchors inside deleted
//! text onto the deletion point instead.

use std::{
  collections::BTreeMap,
  fmt,
  num::NonZeroUsize,
};

use crate::transaction::{
  Assoc,
  ChangeSet,
  Result,
};

/// Stable identifier of an anchor. Item ids are anchor ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(NonZeroUsize);

impl AnchorId {
  pub const fn new(id: NonZeroUsize) -> Self {
    Self(id)
  }

  pub const fn get(self) -> NonZeroUsize {
    self.0
  }
}

impl From<NonZeroUsize> for AnchorId {
  fn from(value: NonZeroUsize) -> Self {
    Self::new(value)
  }
}

impl fmt::Display for AnchorId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gravity {
  /// Text inserted at the point lands after the anchor.
  Left,
  /// Text inserted at the point lands before the anchor; the anchor moves
  /// with the text that follows it.
  #[default]
  Right,
}

impl Gravity {
  pub const fn assoc(self) -> Assoc {
    match self {
      Gravity::Left => Assoc::Before,
      Gravity::Right => Assoc::After,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
  pos:     usize,
  gravity: Gravity,
}

/// How [`AnchorSet::invalidate`] treats the boundaries of a replaced span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
  /// Whole lines were rewritten: anything from the first replaced char up to
  /// (not including) the end goes.
  Lines,
  /// A column span was rewritten: only anchors strictly inside it go.
  Span,
}

#[derive(Debug, Clone)]
pub struct AnchorSet {
  anchors: BTreeMap<AnchorId, Anchor>,
  next_id: NonZeroUsize,
}

impl Default for AnchorSet {
  fn default() -> Self {
    Self {
      anchors: BTreeMap::new(),
      next_id: NonZeroUsize::MIN,
    }
  }
}

impl AnchorSet {
  pub fn len(&self) -> usize {
    self.anchors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.anchors.is_empty()
  }

  /// Place a new anchor at char index `pos`.
  pub fn insert(&mut self, pos: usize, gravity: Gravity) -> AnchorId {
    let id = AnchorId::new(self.next_id);
    self.next_id = self.next_id.saturating_add(1);
    self.anchors.insert(id, Anchor { pos, gravity });
    id
  }

  /// Current char index of an anchor, `None` once it has been removed.
  pub fn get(&self, id: AnchorId) -> Option<usize> {
    self.anchors.get(&id).map(|anchor| anchor.pos)
  }

  pub fn gravity(&self, id: AnchorId) -> Option<Gravity> {
    self.anchors.get(&id).map(|anchor| anchor.gravity)
  }

  pub fn contains(&self, id: AnchorId) -> bool {
    self.anchors.contains_key(&id)
  }

  pub fn remove(&mut self, id: AnchorId) -> bool {
    self.anchors.remove(&id).is_some()
  }

  pub fn clear(&mut self) {
    self.anchors.clear();
  }

  /// Anchors with a char index in `[from, to)`, ordered by position.
  pub fn in_range(&self, from: usize, to: usize) -> Vec<(AnchorId, usize)> {
    let mut found: Vec<_> = self
      .anchors
      .iter()
      .filter(|(_, anchor)| (from..to).contains(&anchor.pos))
      .map(|(id, anchor)| (*id, anchor.pos))
      .collect();
    found.sort_by_key(|(id, pos)| (*pos, *id));
    found
  }

  pub fn iter(&self) -> impl Iterator<Item = (AnchorId, usize)> + '_ {
    self.anchors.iter().map(|(id, anchor)| (*id, anchor.pos))
  }

  /// Move every anchor through `changes`.
  pub fn map(&mut self, changes: &ChangeSet) -> Result<()> {
    if changes.is_empty() || self.anchors.is_empty() {
      return Ok(());
    }
    changes.update_positions(self.anchors.values_mut().map(|anchor| {
      let assoc = anchor.gravity.assoc();
      (&mut anchor.pos, assoc)
    }))
  }

  /// Remove the anchors a write of `[from, to)` destroys. Returns the ids
  /// that were removed.
  pub fn invalidate(&mut self, from: usize, to: usize, mode: Invalidation) -> Vec<AnchorId> {
    let doomed: Vec<AnchorId> = self
      .anchors
      .iter()
      .filter(|(_, anchor)| match mode {
        Invalidation::Lines => from <= anchor.pos && anchor.pos < to,
        Invalidation::Span => from < anchor.pos && anchor.pos < to,
      })
      .map(|(id, _)| *id)
      .collect();
    for id in &doomed {
      self.anchors.remove(id);
    }
    doomed
  }
}
