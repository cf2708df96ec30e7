//! Item discovery: syntax tree + document anchors → [`ItemMap`].
//!
//! Every pass rebuilds the whole map. Identity comes from the marker
//! anchors: an anchor still sitting exactly on an item's todo marker is
//! reused, so its id survives the pass; anchors no item claimed are removed
//! at the end.

use std::collections::{
  HashMap,
  HashSet,
};

use tracing::{
  debug,
  warn,
};

use crate::{
  anchor::{
    AnchorId,
    Gravity,
  },
  document::Document,
  item::{
    Item,
    ItemId,
    ItemMap,
    ItemRange,
    TodoStates,
  },
  markdown,
  messages::{
    MessageCenter,
    MessageSource,
  },
  metadata,
  position::{
    Position,
    TextRange,
  },
  registry::MetadataRegistry,
  tree::{
    self,
    Node,
    NodeId,
    NodeKind,
    SyntaxTree,
    TreeProvider,
  },
};

/// Collaborators a discovery pass reads from.
#[derive(Clone, Copy)]
pub struct DiscoveryContext<'a> {
  pub states:   &'a TodoStates,
  pub registry: &'a MetadataRegistry,
  pub provider: &'a dyn TreeProvider,
}

/// The outcome of one pass.
#[derive(Debug, Default, Clone)]
pub struct Discovery {
  pub items:      ItemMap,
  /// List-item node → item id, for position lookups through the tree.
  pub node_index: HashMap<NodeId, ItemId>,
  pub tree:       Option<SyntaxTree>,
}

/// Run a full discovery pass over `doc`.
///
/// A missing syntax tree yields an empty result and a warning in
/// `messages`; anchors are left alone in that case.
pub fn discover(
  doc: &mut Document,
  cx: &DiscoveryContext<'_>,
  messages: &mut MessageCenter,
) -> Discovery {
  let Some(tree) = cx.provider.parse(doc.text()) else {
    warn!(document = ?doc.id(), "no syntax tree, todo discovery skipped");
    messages.warning(
      MessageSource::Discovery,
      "todo items unavailable: the document could not be parsed",
    );
    return Discovery::default();
  };

  let mut pass = Pass::new(doc, cx);
  let mut stack: Vec<(Node<'_>, Option<ItemId>)> = Vec::new();
  for node in tree::list_items(&tree) {
    while let Some((top, _)) = stack.last() {
      if top.is_ancestor_of(node) {
        break;
      }
      stack.pop();
    }
    // Only the immediate enclosing list item can be the parent.
    let parent_id = stack.last().and_then(|(_, id)| *id);
    let id = pass.visit(node, parent_id);
    stack.push((node, id));
  }
  drop(stack);

  let Pass {
    items, node_index, ..
  } = pass.finish();
  debug!(
    document = ?doc.id(),
    version = doc.version(),
    items = items.len(),
    "discovered todo items"
  );
  Discovery {
    items,
    node_index,
    tree: Some(tree),
  }
}

struct Pass<'d, 'c> {
  doc:        &'d mut Document,
  cx:         &'d DiscoveryContext<'c>,
  existing:   HashMap<Position, AnchorId>,
  claimed:    HashSet<AnchorId>,
  items:      ItemMap,
  node_index: HashMap<NodeId, ItemId>,
}

impl<'d, 'c> Pass<'d, 'c> {
  fn new(doc: &'d mut Document, cx: &'d DiscoveryContext<'c>) -> Self {
    let mut existing: HashMap<Position, AnchorId> = HashMap::new();
    for (id, pos) in doc.anchors_in_rows(0, doc.line_count()) {
      existing
        .entry(pos)
        .and_modify(|current| *current = (*current).min(id))
        .or_insert(id);
    }
    Self {
      doc,
      cx,
      existing,
      claimed: HashSet::new(),
      items: ItemMap::new(),
      node_index: HashMap::new(),
    }
  }

  fn visit(&mut self, node: Node<'_>, parent_id: Option<ItemId>) -> Option<ItemId> {
    let item = self.build(node, parent_id)?;
    let id = item.id;
    self.node_index.insert(node.id(), id);
    self.items.insert(item);
    if let Some(parent) = parent_id.and_then(|parent| self.items.get_mut(parent)) {
      parent.children.push(id);
    }
    Some(id)
  }

  fn build(&mut self, node: Node<'_>, parent_id: Option<ItemId>) -> Option<Item> {
    let raw_range = node.range();
    let row = raw_range.start.row;
    let line = self.doc.line(row)?.into_owned();

    let list_marker = tree::list_marker(node)?;
    let NodeKind::ListMarker(list_marker_type) = list_marker.kind() else {
      return None;
    };
    let marker_range = list_marker.range();
    if marker_range.start.row != row {
      return None;
    }
    let list_marker_text = line.get(marker_range.start.col..marker_range.end.col)?;

    let after = line.get(marker_range.end.col..)?;
    let gap = after.len() - after.trim_start().len();
    if gap == 0 {
      return None;
    }
    let states = self.cx.states;
    let found = states.match_at(&line, marker_range.end.col + gap)?;
    let marker_position = Position::new(row, found.col);

    let id = self.claim_anchor(marker_position)?;
    let range = semantic_range(self.doc, raw_range);
    let first_content_range = tree::first_paragraph(node)
      .map(|paragraph| paragraph.range())
      .unwrap_or_else(|| range.into());
    let metadata = metadata::extract(
      self.doc.text().slice(..),
      first_content_range,
      self.cx.registry,
    );

    Some(Item {
      id,
      state: found.state.name.clone(),
      state_type: found.state.state_type,
      range,
      raw_range,
      first_content_range,
      marker_position,
      marker_text: found.text.clone(),
      marker_style: found.style,
      list_marker_type,
      list_marker_text: list_marker_text.to_owned(),
      todo_text: line[found.end_col()..].trim().to_owned(),
      metadata,
      children: Vec::new(),
      parent_id,
    })
  }

  fn claim_anchor(&mut self, pos: Position) -> Option<AnchorId> {
    if let Some(&id) = self.existing.get(&pos)
      && self.claimed.insert(id)
    {
      return Some(id);
    }
    match self.doc.create_anchor(pos, Gravity::Right) {
      Ok(id) => {
        self.claimed.insert(id);
        Some(id)
      },
      Err(err) => {
        warn!("failed to anchor todo marker at {pos}: {err}");
        None
      },
    }
  }

  fn finish(self) -> Self {
    let stale: Vec<AnchorId> = self
      .doc
      .anchors()
      .iter()
      .map(|(id, _)| id)
      .filter(|id| !self.claimed.contains(id))
      .collect();
    for id in stale {
      self.doc.delete_anchor(id);
    }
    self
  }
}

fn leading_whitespace(line: &str) -> usize {
  line.len() - line.trim_start().len()
}

/// Whether a list marker token (followed by whitespace or the end of the
/// line) starts at `col`.
fn starts_list_marker(line: &str, col: usize) -> bool {
  markdown::list_marker_at(line, col).is_some_and(|(_, len)| {
    line[col + len..]
      .chars()
      .next()
      .is_none_or(char::is_whitespace)
  })
}

/// The lines an item owns: its first line plus every following non-blank
/// line up to the next list marker indented no deeper than the item.
pub fn semantic_range(doc: &Document, raw: TextRange) -> ItemRange {
  let start_row = raw.start.row;
  let mut last_row = raw.end.row;
  if raw.end.col == 0 && last_row > start_row {
    last_row -= 1;
  }
  last_row = last_row.min(doc.line_count().saturating_sub(1));

  let indent = doc
    .line(start_row)
    .map(|line| leading_whitespace(&line))
    .unwrap_or(0);

  let mut end_row = start_row;
  for row in start_row + 1..=last_row {
    let Some(line) = doc.line(row) else {
      break;
    };
    if line.trim().is_empty() {
      continue;
    }
    let line_indent = leading_whitespace(&line);
    if line_indent <= indent && starts_list_marker(&line, line_indent) {
      break;
    }
    end_row = row;
  }

  let end_col = doc
    .line(end_row)
    .map(|line| line.trim_end().len())
    .unwrap_or(0);
  ItemRange::new(
    Position::new(start_row, indent),
    Position::new(end_row, end_col),
  )
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
  use crate::{
    config::Config,
    document::DocumentId,
    item::{
      ListMarkerType,
      StateType,
    },
    markdown::MarkdownTreeProvider,
  };

  struct Fixture {
    states:   TodoStates,
    registry: MetadataRegistry,
    provider: MarkdownTreeProvider,
    messages: MessageCenter,
  }

  impl Fixture {
    fn new() -> Self {
      let config = Config::default();
      Self {
        states:   config.todo_states(),
        registry: config.registry().unwrap(),
        provider: MarkdownTreeProvider::new(),
        messages: MessageCenter::default(),
      }
    }

    fn discover(&mut self, doc: &mut Document) -> ItemMap {
      let cx = DiscoveryContext {
        states:   &self.states,
        registry: &self.registry,
        provider: &self.provider,
      };
      discover(doc, &cx, &mut self.messages).items
    }
  }

  fn doc(text: &str) -> Document {
    Document::new(DocumentId::new(NonZeroUsize::MIN), Rope::from(text))
  }

  fn by_text<'a>(items: &'a ItemMap, text: &str) -> &'a Item {
    items
      .iter()
      .find(|item| item.todo_text == text)
      .unwrap_or_else(|| panic!("no item '{text}'"))
  }

  #[test]
  fn parent_with_two_children() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] Parent\n  - [ ] ChildA\n  - [x] ChildB\n");
    let items = fixture.discover(&mut doc);

    assert_eq!(items.len(), 3);
    let parent = by_text(&items, "Parent");
    let a = by_text(&items, "ChildA");
    let b = by_text(&items, "ChildB");
    assert_eq!(parent.children, vec![a.id, b.id]);
    assert_eq!(a.parent_id, Some(parent.id));
    assert_eq!(b.parent_id, Some(parent.id));
    assert_eq!(parent.parent_id, None);

    assert_eq!(parent.state, "unchecked");
    assert_eq!(b.state, "checked");
    assert_eq!(b.state_type, StateType::Complete);
    assert_eq!(parent.state_type, StateType::Incomplete);

    assert_eq!(parent.marker_position, Position::new(0, 2));
    assert_eq!(parent.marker_text, "[ ]");
    assert_eq!(parent.list_marker_text, "-");
    assert_eq!(
      parent.range,
      ItemRange::new(Position::new(0, 0), Position::new(2, 14))
    );
    assert_eq!(
      a.range,
      ItemRange::new(Position::new(1, 2), Position::new(1, 14))
    );
    assert_eq!(items.roots().count(), 1);
  }

  #[test]
  fn tab_indented_children() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] a\n\t- [ ] b\n");
    let items = fixture.discover(&mut doc);

    assert_eq!(items.len(), 2);
    let a = by_text(&items, "a");
    let b = by_text(&items, "b");
    assert_eq!(b.parent_id, Some(a.id));
    assert_eq!(a.children, vec![b.id]);
    assert_eq!(b.marker_position, Position::new(1, 3));
    assert_eq!(
      a.range,
      ItemRange::new(Position::new(0, 0), Position::new(1, 8))
    );
  }

  #[test]
  fn crlf_line_endings() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] a\r\n  - [ ] b\r\n- [x] c\r\n");
    let items = fixture.discover(&mut doc);

    assert_eq!(items.len(), 3);
    let a = by_text(&items, "a");
    let b = by_text(&items, "b");
    let c = by_text(&items, "c");
    assert_eq!(b.parent_id, Some(a.id));
    assert_eq!(c.parent_id, None);
    assert_eq!(
      a.range,
      ItemRange::new(Position::new(0, 0), Position::new(1, 9))
    );
    assert_eq!(
      c.range,
      ItemRange::new(Position::new(2, 0), Position::new(2, 7))
    );
    assert_eq!(c.state, "checked");
  }

  #[test]
  fn item_metadata_comes_from_the_first_paragraph() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] Buy milk @priority(high) @started(01/01/24 10:00)\n  - [ ] child @p(low)\n");
    let items = fixture.discover(&mut doc);

    let parent = by_text(&items, "Buy milk @priority(high) @started(01/01/24 10:00)");
    let tags: Vec<_> = parent
      .metadata
      .entries()
      .iter()
      .map(|entry| (entry.tag.as_str(), entry.value.as_str()))
      .collect();
    assert_eq!(tags, vec![("priority", "high"), ("started", "01/01/24 10:00")]);

    let child = by_text(&items, "child @p(low)");
    assert_eq!(child.metadata.value("priority"), Some("low"));
  }

  #[test]
  fn continuation_lines_belong_to_the_item() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] a\n  continued\n\n  more   \n- [ ] b\n\ntext\n");
    let items = fixture.discover(&mut doc);

    let a = by_text(&items, "a");
    assert_eq!(a.range.end, Position::new(3, 6));
    assert_eq!(a.range.end_row_exclusive(), 4);
    let b = by_text(&items, "b");
    assert_eq!(b.range, ItemRange::new(Position::new(4, 0), Position::new(4, 7)));
  }

  #[test]
  fn plain_bullets_are_not_items_and_not_parents() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] top\n  - plain\n    - [ ] nested\n- [x]no space\n");
    let items = fixture.discover(&mut doc);

    assert_eq!(items.len(), 2);
    let nested = by_text(&items, "nested");
    assert_eq!(nested.parent_id, None);
    assert!(by_text(&items, "top").children.is_empty());
  }

  #[test]
  fn ordered_and_symbolic_markers() {
    let mut fixture = Fixture::new();
    let mut doc = doc("1. [ ] one\n2) ✔ two\n");
    let items = fixture.discover(&mut doc);

    let one = by_text(&items, "one");
    assert_eq!(one.list_marker_type, ListMarkerType::Ordered);
    assert_eq!(one.list_marker_text, "1.");
    assert_eq!(one.marker_position, Position::new(0, 3));

    let two = by_text(&items, "two");
    assert_eq!(two.state, "checked");
    assert_eq!(two.marker_text, "✔");
  }

  #[test]
  fn repeated_passes_are_identical() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] a\n  - [ ] b\n- [x] c\n");
    let first = fixture.discover(&mut doc);
    let second = fixture.discover(&mut doc);

    assert_eq!(first, second);
    assert_eq!(doc.anchors().len(), 3);
  }

  #[test]
  fn ids_survive_unrelated_edits_above() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] a\n  - [ ] b\n");
    let before = fixture.discover(&mut doc);
    let a = by_text(&before, "a").id;
    let b = by_text(&before, "b").id;

    doc.set_lines(0, 0, &["# Title", ""]).unwrap();
    let after = fixture.discover(&mut doc);

    assert_eq!(by_text(&after, "a").id, a);
    assert_eq!(by_text(&after, "b").id, b);
    assert_eq!(by_text(&after, "b").marker_position, Position::new(3, 4));
    assert_eq!(by_text(&after, "b").parent_id, Some(a));
  }

  #[test]
  fn unclaimed_anchors_are_collected() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] a\nplain\n");
    let stray = doc.create_anchor(Position::new(1, 0), Gravity::Right).unwrap();
    fixture.discover(&mut doc);

    assert!(doc.resolve_anchor(stray).is_none());
    assert_eq!(doc.anchors().len(), 1);

    doc.set_lines(0, 1, &[] as &[&str]).unwrap();
    assert!(fixture.discover(&mut doc).is_empty());
    assert!(doc.anchors().is_empty());
  }

  #[test]
  fn parse_failures_leave_anchors_alone() {
    let mut fixture = Fixture::new();
    let mut doc = doc("- [ ] a\n");
    fixture.discover(&mut doc);
    assert_eq!(doc.anchors().len(), 1);

    let failing = |_: &Rope| -> Option<SyntaxTree> { None };
    let cx = DiscoveryContext {
      states:   &fixture.states,
      registry: &fixture.registry,
      provider: &failing,
    };
    let result = discover(&mut doc, &cx, &mut fixture.messages);

    assert!(result.items.is_empty());
    assert!(result.tree.is_none());
    assert_eq!(doc.anchors().len(), 1);
    assert_eq!(
      fixture.messages.active().map(|m| m.source),
      Some(MessageSource::Discovery)
    );
  }

  /// A random outline: `(depth, is_todo)` per line.
  #[derive(Debug, Clone)]
  struct Outline(Vec<(usize, bool)>);

  impl Arbitrary for Outline {
    fn arbitrary(g: &mut Gen) -> Self {
      let len = usize::arbitrary(g) % 24;
      let mut depth = 0;
      let mut lines = Vec::with_capacity(len);
      for _ in 0..len {
        depth = usize::arbitrary(g) % (depth + 2);
        lines.push((depth, bool::arbitrary(g) || bool::arbitrary(g)));
      }
      Outline(lines)
    }
  }

  impl Outline {
    fn render(&self) -> String {
      self
        .0
        .iter()
        .enumerate()
        .map(|(i, &(depth, todo))| {
          let indent = "  ".repeat(depth);
          if todo {
            format!("{indent}- [ ] item {i}\n")
          } else {
            format!("{indent}- note {i}\n")
          }
        })
        .collect()
    }
  }

  quickcheck::quickcheck! {
    fn hierarchy_links_are_symmetric(outline: Outline) -> bool {
      let mut fixture = Fixture::new();
      let mut doc = doc(&outline.render());
      let items = fixture.discover(&mut doc);

      let todos = outline.0.iter().filter(|(_, todo)| *todo).count();
      items.len() == todos
        && items.iter().all(|item| {
          let parent_ok = item.parent_id.is_none_or(|parent| {
            items
              .get(parent)
              .is_some_and(|parent| parent.children.contains(&item.id))
          });
          let children_ok = item.children.iter().all(|child| {
            items
              .get(*child)
              .is_some_and(|child| child.parent_id == Some(item.id))
          });
          parent_ok && children_ok
        })
    }
  }
}
