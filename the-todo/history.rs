use std::num::NonZeroUsize;

use ropey::Rope;
use thiserror::Error;

use crate::transaction::{
  ChangeSet,
  Transaction,
  TransactionError,
};

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors that can occur during history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
  #[error("transaction error: {0}")]
  Transaction(#[from] TransactionError),
  #[error("revision index {index} is out of bounds (max: {max})")]
  RevisionOutOfBounds { index: usize, max: usize },
}

/// A pending jump in history that has not yet been applied.
///
/// The caller must apply all transactions successfully before calling
/// [`History::apply_jump`], so history state only changes once the document
/// did.
#[derive(Debug, Clone)]
pub struct HistoryJump {
  /// The transactions to apply, in order.
  pub transactions: Vec<Transaction>,
  /// The target revision index after the jump.
  pub target:       usize,
}

impl HistoryJump {
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.transactions.is_empty()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.transactions.len()
  }
}

/// Undo tree of a document.
///
/// Revisions live in a vector whose first element is the empty root. Every
/// other revision stores the transaction that leads to it from its parent
/// and the inversion of that transaction. One revision is one undo step, so
/// everything applied between two [`commit_revision`] calls undoes together.
///
/// [`commit_revision`]: History::commit_revision
#[derive(Debug)]
pub struct History {
  revisions: Vec<Revision>,
  current:   usize,
}

#[derive(Debug, Clone)]
struct Revision {
  parent:      usize,
  last_child:  Option<NonZeroUsize>,
  transaction: Transaction,
  // Delete operations don't store the removed text, so keep the inversion.
  inversion:   Transaction,
}

impl Default for History {
  fn default() -> Self {
    Self {
      revisions: vec![Revision {
        parent:      0,
        last_child:  None,
        transaction: Transaction::from(ChangeSet::new("".into())),
        inversion:   Transaction::from(ChangeSet::new("".into())),
      }],
      current:   0,
    }
  }
}

impl History {
  /// Record `transaction`, applied to `original`, as a new revision below
  /// the current one.
  pub fn commit_revision(&mut self, transaction: &Transaction, original: &Rope) -> Result<()> {
    let inversion = transaction.invert(original)?;

    let new_current = self.revisions.len();
    self.revisions[self.current].last_child = NonZeroUsize::new(new_current);
    self.revisions.push(Revision {
      parent: self.current,
      last_child: None,
      transaction: transaction.clone(),
      inversion,
    });
    self.current = new_current;
    Ok(())
  }

  #[inline]
  pub fn current_revision(&self) -> usize {
    self.current
  }

  #[inline]
  pub const fn at_root(&self) -> bool {
    self.current == 0
  }

  /// Returns the number of revisions in the history, root included.
  #[inline]
  pub fn len(&self) -> usize {
    self.revisions.len()
  }

  /// Returns whether the history only has the root revision.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.revisions.len() <= 1
  }

  fn validate_revision(&self, revision: usize) -> Result<()> {
    if revision >= self.revisions.len() {
      return Err(HistoryError::RevisionOutOfBounds {
        index: revision,
        max:   self.revisions.len().saturating_sub(1),
      });
    }
    Ok(())
  }

  /// Prepare an undo without mutating history state. `None` at the root.
  pub fn undo(&self) -> Option<HistoryJump> {
    if self.at_root() {
      return None;
    }

    let current_revision = &self.revisions[self.current];
    Some(HistoryJump {
      transactions: vec![current_revision.inversion.clone()],
      target:       current_revision.parent,
    })
  }

  /// Prepare a redo without mutating history state. `None` when the current
  /// revision has no child.
  pub fn redo(&self) -> Option<HistoryJump> {
    let last_child = self.revisions[self.current].last_child?;

    Some(HistoryJump {
      transactions: vec![self.revisions[last_child.get()].transaction.clone()],
      target:       last_child.get(),
    })
  }

  /// Move to the jump's target. Call only after its transactions applied.
  pub fn apply_jump(&mut self, jump: &HistoryJump) -> Result<()> {
    self.validate_revision(jump.target)?;
    self.current = jump.target;
    Ok(())
  }
}
