//! The todo engine ties configuration, discovery, caching and mutation
//! together for a host that owns the documents.
//!
//! # Example
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//!
//! use ropey::Rope;
//! use the_todo::{
//!   config::Config,
//!   document::{
//!     Document,
//!     DocumentId,
//!   },
//!   edit,
//!   engine::TodoEngine,
//! };
//!
//! let mut engine = TodoEngine::with_markdown(&Config::default()).unwrap();
//! let mut doc = Document::new(
//!   DocumentId::new(NonZeroUsize::MIN),
//!   Rope::from("- [ ] write docs\n"),
//! );
//!
//! let id = engine.items(&mut doc).ids()[0];
//! let checked = engine.states().get("checked").cloned().unwrap();
//! engine
//!   .with_live_item(&mut doc, id, |item, _, _| vec![edit::set_state(item, &checked)])
//!   .unwrap();
//! assert_eq!(doc.text().to_string(), "- [x] write docs\n");
//! ```

use tracing::debug;

use crate::{
  cache::ItemCache,
  config::{
    self,
    Config,
  },
  discovery::{
    Discovery,
    DiscoveryContext,
    discover,
  },
  document::{
    self,
    Document,
    DocumentId,
  },
  hunk::{
    self,
    DiffOutcome,
    Hunk,
  },
  item::{
    Item,
    ItemId,
    ItemMap,
    TodoStates,
  },
  markdown::MarkdownTreeProvider,
  messages::MessageCenter,
  position::Position,
  registry::MetadataRegistry,
  tree::TreeProvider,
};

pub struct TodoEngine {
  states:   TodoStates,
  registry: MetadataRegistry,
  provider: Box<dyn TreeProvider>,
  cache:    ItemCache,
  messages: MessageCenter,
}

impl TodoEngine {
  pub fn new(config: &Config, provider: impl TreeProvider + 'static) -> config::Result<Self> {
    config.validate()?;
    Ok(Self {
      states:   config.todo_states(),
      registry: config.registry()?,
      provider: Box::new(provider),
      cache:    ItemCache::default(),
      messages: MessageCenter::default(),
    })
  }

  pub fn with_markdown(config: &Config) -> config::Result<Self> {
    Self::new(config, MarkdownTreeProvider::new())
  }

  pub fn states(&self) -> &TodoStates {
    &self.states
  }

  pub fn registry(&self) -> &MetadataRegistry {
    &self.registry
  }

  /// For registering choice providers after construction.
  pub fn registry_mut(&mut self) -> &mut MetadataRegistry {
    &mut self.registry
  }

  pub fn messages(&self) -> &MessageCenter {
    &self.messages
  }

  pub fn messages_mut(&mut self) -> &mut MessageCenter {
    &mut self.messages
  }

  pub fn cache(&self) -> &ItemCache {
    &self.cache
  }

  pub fn init(&mut self, doc: DocumentId) {
    self.cache.init(doc);
  }

  pub fn dispose(&mut self, doc: DocumentId) -> bool {
    self.cache.dispose(doc)
  }

  pub fn reset(&mut self) {
    self.cache.reset();
  }

  /// The discovery result for the document's current version.
  pub fn discovery(&mut self, doc: &mut Document) -> &Discovery {
    let Self {
      states,
      registry,
      provider,
      cache,
      messages,
    } = self;
    let cx = DiscoveryContext {
      states:   &*states,
      registry: &*registry,
      provider: &**provider,
    };
    cache.get_or_refresh(doc, |doc| discover(doc, &cx, messages))
  }

  pub fn items(&mut self, doc: &mut Document) -> &ItemMap {
    &self.discovery(doc).items
  }

  pub fn item(&mut self, doc: &mut Document, id: ItemId) -> Option<&Item> {
    self.items(doc).get(id)
  }

  /// Innermost item whose list item contains `pos`.
  pub fn item_at(&mut self, doc: &mut Document, pos: Position) -> Option<&Item> {
    self.discovery(doc);
    let id = self.cache.item_at(doc, pos)?;
    self.cache.items(doc.id())?.get(id)
  }

  pub fn apply_diff(
    &mut self,
    doc: &mut Document,
    hunks: impl IntoIterator<Item = Hunk>,
  ) -> document::Result<DiffOutcome> {
    hunk::apply_diff(doc, hunks)
  }

  /// Run an edit against an item that may have changed or vanished since
  /// `id` was handed out.
  ///
  /// The anchor is checked first; if it no longer resolves, or no item owns
  /// it after a refresh, nothing is touched and `Ok(None)` is returned.
  /// Otherwise `build` sees the current item and its hunks are applied as
  /// one batch.
  pub fn with_live_item<F>(
    &mut self,
    doc: &mut Document,
    id: ItemId,
    build: F,
  ) -> document::Result<Option<DiffOutcome>>
  where
    F: FnOnce(&Item, &Document, &MetadataRegistry) -> Vec<Hunk>,
  {
    if doc.resolve_anchor(id).is_none() {
      debug!(item = %id, "todo item no longer exists, edit dropped");
      return Ok(None);
    }
    let Some(item) = self.item(doc, id).cloned() else {
      debug!(item = %id, "anchor no longer marks a todo item, edit dropped");
      return Ok(None);
    };
    let hunks = build(&item, &*doc, &self.registry);
    hunk::apply_diff(doc, hunks).map(Some)
  }

  /// Values offered for `tag`, optionally in the context of an item.
  /// Provider failures land in [`TodoEngine::messages`].
  pub fn choices(&mut self, doc: &mut Document, tag: &str, item: Option<ItemId>) -> Vec<String> {
    let Self {
      states,
      registry,
      provider,
      cache,
      messages,
    } = self;
    let cx = DiscoveryContext {
      states:   &*states,
      registry: &*registry,
      provider: &**provider,
    };
    let discovery = cache.get_or_refresh(doc, |doc| discover(doc, &cx, &mut *messages));
    let item = item.and_then(|id| discovery.items.get(id));
    registry.choices(tag, item, messages)
  }
}
