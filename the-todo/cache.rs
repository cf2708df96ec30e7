//! Version-keyed item cache.
//!
//! One slot per document, holding the last [`Discovery`] and the document
//! version it was computed at. A read at the same version is a map lookup;
//! any other version triggers a full pass that replaces the slot.
//!
//! # Example
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//!
//! use ropey::Rope;
//! use the_todo::{
//!   cache::ItemCache,
//!   discovery::Discovery,
//!   document::{
//!     Document,
//!     DocumentId,
//!   },
//! };
//!
//! let mut doc = Document::new(
//!   DocumentId::new(NonZeroUsize::MIN),
//!   Rope::from("- [ ] a\n"),
//! );
//! let mut cache = ItemCache::default();
//! cache.init(doc.id());
//! let found = cache.get_or_refresh(&mut doc, |_| Discovery::default());
//! assert!(found.items.is_empty());
//! cache.dispose(doc.id());
//! ```

use std::collections::HashMap;

use tracing::debug;

use crate::{
  discovery::Discovery,
  document::{
    Document,
    DocumentId,
  },
  item::{
    ItemId,
    ItemMap,
  },
  position::Position,
  tree::NodeKind,
};

#[derive(Debug, Clone)]
struct CacheEntry {
  version:   u64,
  discovery: Discovery,
}

#[derive(Debug, Default, Clone)]
pub struct ItemCache {
  slots: HashMap<DocumentId, Option<CacheEntry>>,
}

impl ItemCache {
  /// Start tracking a document. Existing entries are kept.
  pub fn init(&mut self, doc: DocumentId) {
    self.slots.entry(doc).or_insert(None);
  }

  /// Forget a document and everything cached for it.
  pub fn dispose(&mut self, doc: DocumentId) -> bool {
    self.slots.remove(&doc).is_some()
  }

  pub fn reset(&mut self) {
    self.slots.clear();
  }

  pub fn is_tracked(&self, doc: DocumentId) -> bool {
    self.slots.contains_key(&doc)
  }

  /// Whether the cached entry matches the document's current version.
  pub fn is_fresh(&self, doc: &Document) -> bool {
    self.entry(doc.id()).is_some_and(|entry| entry.version == doc.version())
  }

  /// Cached result, fresh or not.
  pub fn peek(&self, doc: DocumentId) -> Option<&Discovery> {
    self.entry(doc).map(|entry| &entry.discovery)
  }

  /// Cached version of a document's items.
  pub fn cached_version(&self, doc: DocumentId) -> Option<u64> {
    self.entry(doc).map(|entry| entry.version)
  }

  /// Return the discovery for the document's current version, running
  /// `refresh` when the cached one is missing or stale. Untracked documents
  /// are tracked implicitly.
  pub fn get_or_refresh<F>(&mut self, doc: &mut Document, refresh: F) -> &Discovery
  where
    F: FnOnce(&mut Document) -> Discovery,
  {
    let version = doc.version();
    let slot = self.slots.entry(doc.id()).or_insert(None);
    let entry = match slot.take() {
      Some(entry) if entry.version == version => entry,
      _ => {
        debug!(document = ?doc.id(), version, "refreshing todo items");
        // discovery moves anchors but never bumps the version
        CacheEntry {
          discovery: refresh(doc),
          version,
        }
      },
    };
    &slot.insert(entry).discovery
  }

  /// Innermost item containing `pos`, resolved through the cached tree.
  /// Requires a fresh entry.
  pub fn item_at(&self, doc: &Document, pos: Position) -> Option<ItemId> {
    let entry = self.entry(doc.id())?;
    if entry.version != doc.version() {
      return None;
    }
    let tree = entry.discovery.tree.as_ref()?;
    let mut node = Some(tree.descendant_for_position(pos));
    while let Some(current) = node {
      if current.kind() == NodeKind::ListItem
        && let Some(&id) = entry.discovery.node_index.get(&current.id())
      {
        return Some(id);
      }
      node = current.parent();
    }
    None
  }

  pub fn items(&self, doc: DocumentId) -> Option<&ItemMap> {
    self.peek(doc).map(|discovery| &discovery.items)
  }

  fn entry(&self, doc: DocumentId) -> Option<&CacheEntry> {
    self.slots.get(&doc)?.as_ref()
  }
}
