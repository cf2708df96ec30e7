//! Syntax tree adapter.
//!
//! Trees are supplied by a [`TreeProvider`]; discovery only relies on the
//! node model here and the three queries at the bottom of the module:
//! [`list_items`], [`list_marker`] and [`first_paragraph`].
//!
//! Nodes live in an arena owned by [`SyntaxTree`] and are addressed by
//! [`NodeId`]. A [`Node`] is a cheap borrowed view used for navigation.

use std::{
  collections::VecDeque,
  ops,
};

use ropey::{
  Rope,
  RopeSlice,
};
use serde::{
  Deserialize,
  Serialize,
};

use crate::position::{
  self,
  Position,
  TextRange,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListMarkerType {
  Ordered,
  Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
  Document,
  List(ListMarkerType),
  ListItem,
  ListMarker(ListMarkerType),
  Paragraph,
  Heading,
  BlockQuote,
  CodeBlock,
  /// Any other block the provider reports.
  Block,
}

impl NodeKind {
  /// Node type names as tree-sitter-markdown spells them.
  pub const fn as_str(self) -> &'static str {
    match self {
      NodeKind::Document => "document",
      NodeKind::List(_) => "list",
      NodeKind::ListItem => "list_item",
      NodeKind::ListMarker(ListMarkerType::Ordered) => "list_marker_dot",
      NodeKind::ListMarker(ListMarkerType::Unordered) => "list_marker_minus",
      NodeKind::Paragraph => "paragraph",
      NodeKind::Heading => "atx_heading",
      NodeKind::BlockQuote => "block_quote",
      NodeKind::CodeBlock => "fenced_code_block",
      NodeKind::Block => "block",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
  pub const fn index(self) -> usize {
    self.0 as usize
  }
}

#[derive(Debug, Clone)]
struct NodeData {
  kind:     NodeKind,
  bytes:    ops::Range<usize>,
  range:    TextRange,
  parent:   Option<NodeId>,
  children: Vec<NodeId>,
}

/// A parsed document. Node ids are valid for this tree only.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
  nodes: Vec<NodeData>,
}

impl SyntaxTree {
  pub fn root(&self) -> Node<'_> {
    Node {
      tree: self,
      id:   NodeId(0),
    }
  }

  pub fn node(&self, id: NodeId) -> Option<Node<'_>> {
    (id.index() < self.nodes.len()).then_some(Node { tree: self, id })
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.len() <= 1
  }

  /// Pre-order (document order) traversal of every node.
  pub fn preorder(&self) -> impl Iterator<Item = Node<'_>> + '_ {
    let mut stack = vec![NodeId(0)];
    std::iter::from_fn(move || {
      let id = stack.pop()?;
      stack.extend(self.nodes[id.index()].children.iter().rev().copied());
      Some(Node { tree: self, id })
    })
  }

  /// Deepest node whose range contains `pos`.
  pub fn descendant_for_position(&self, pos: Position) -> Node<'_> {
    let mut node = self.root();
    'descend: loop {
      for child in node.children() {
        if child.range().contains(pos) {
          node = child;
          continue 'descend;
        }
      }
      return node;
    }
  }

  fn data(&self, id: NodeId) -> &NodeData {
    &self.nodes[id.index()]
  }
}

#[derive(Clone, Copy)]
pub struct Node<'t> {
  tree: &'t SyntaxTree,
  id:   NodeId,
}

impl std::fmt::Debug for Node<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Node")
      .field("id", &self.id)
      .field("kind", &self.kind())
      .field("range", &self.range())
      .finish()
  }
}

impl<'t> Node<'t> {
  pub fn id(&self) -> NodeId {
    self.id
  }

  pub fn kind(&self) -> NodeKind {
    self.tree.data(self.id).kind
  }

  pub fn range(&self) -> TextRange {
    self.tree.data(self.id).range
  }

  pub fn byte_range(&self) -> ops::Range<usize> {
    self.tree.data(self.id).bytes.clone()
  }

  pub fn parent(&self) -> Option<Node<'t>> {
    self.tree.data(self.id).parent.map(|id| Node {
      tree: self.tree,
      id,
    })
  }

  pub fn children(&self) -> impl Iterator<Item = Node<'t>> + 't {
    let tree = self.tree;
    tree
      .data(self.id)
      .children
      .iter()
      .map(move |&id| Node { tree, id })
  }

  pub fn child_count(&self) -> usize {
    self.tree.data(self.id).children.len()
  }

  /// Whether `self` encloses `other` through any number of parent links.
  /// Grouping nodes such as lists in between are walked through.
  pub fn is_ancestor_of(&self, other: Node<'_>) -> bool {
    let mut current = other.parent();
    while let Some(node) = current {
      if node.id == self.id {
        return true;
      }
      current = node.parent();
    }
    false
  }

  /// Closest enclosing list item, skipping the list that groups it.
  pub fn parent_list_item(&self) -> Option<Node<'t>> {
    let mut current = self.parent();
    while let Some(node) = current {
      if node.kind() == NodeKind::ListItem {
        return Some(node);
      }
      current = node.parent();
    }
    None
  }
}

/// Source of syntax trees. Returning `None` signals a parse failure.
pub trait TreeProvider {
  fn parse(&self, text: &Rope) -> Option<SyntaxTree>;
}

impl<F> TreeProvider for F
where
  F: Fn(&Rope) -> Option<SyntaxTree>,
{
  fn parse(&self, text: &Rope) -> Option<SyntaxTree> {
    self(text)
  }
}

/// Incrementally assembles a [`SyntaxTree`] from properly nested open/close
/// calls with byte offsets. Positions are derived from the rope.
pub struct TreeBuilder<'a> {
  text:  RopeSlice<'a>,
  nodes: Vec<NodeData>,
  stack: Vec<NodeId>,
}

impl<'a> TreeBuilder<'a> {
  pub fn new(text: RopeSlice<'a>) -> Self {
    let len = text.len_bytes();
    let root = NodeData {
      kind:     NodeKind::Document,
      bytes:    0..len,
      range:    TextRange::new(Position::zero(), position::position_at_byte(text, len)),
      parent:   None,
      children: Vec::new(),
    };
    Self {
      text,
      nodes: vec![root],
      stack: vec![NodeId(0)],
    }
  }

  /// The innermost open node.
  pub fn current(&self) -> NodeId {
    self.stack.last().copied().unwrap_or(NodeId(0))
  }

  pub fn current_kind(&self) -> NodeKind {
    self.nodes[self.current().index()].kind
  }

  /// Start byte of the innermost open node, `None` at the root.
  pub fn current_start(&self) -> Option<usize> {
    (self.stack.len() > 1).then(|| self.nodes[self.current().index()].bytes.start)
  }

  pub fn open(&mut self, kind: NodeKind, start: usize) -> NodeId {
    let id = self.push(kind, start..start);
    self.stack.push(id);
    id
  }

  /// Close the innermost open node at byte `end`.
  pub fn close(&mut self, end: usize) {
    if self.stack.len() <= 1 {
      return;
    }
    if let Some(id) = self.stack.pop() {
      self.set_end(id, end);
    }
  }

  /// Add a childless node under the innermost open node.
  pub fn leaf(&mut self, kind: NodeKind, bytes: ops::Range<usize>) -> NodeId {
    self.push(kind, bytes)
  }

  pub fn finish(mut self) -> SyntaxTree {
    let len = self.text.len_bytes();
    while self.stack.len() > 1 {
      self.close(len);
    }
    SyntaxTree { nodes: self.nodes }
  }

  fn push(&mut self, kind: NodeKind, bytes: ops::Range<usize>) -> NodeId {
    let id = NodeId(self.nodes.len() as u32);
    let parent = self.current();
    let range = TextRange::new(
      position::position_at_byte(self.text, bytes.start),
      position::position_at_byte(self.text, bytes.end),
    );
    self.nodes.push(NodeData {
      kind,
      bytes,
      range,
      parent: Some(parent),
      children: Vec::new(),
    });
    self.nodes[parent.index()].children.push(id);
    id
  }

  fn set_end(&mut self, id: NodeId, end: usize) {
    let node = &mut self.nodes[id.index()];
    let end = end.max(node.bytes.start);
    node.bytes.end = end;
    node.range.end = position::position_at_byte(self.text, end);
  }
}

// Queries.

/// Every list item in document order.
pub fn list_items(tree: &SyntaxTree) -> Vec<Node<'_>> {
  tree
    .preorder()
    .filter(|node| node.kind() == NodeKind::ListItem)
    .collect()
}

/// The list marker (`-`, `*`, `+`, `1.`, `1)`) of a list item.
pub fn list_marker<'t>(item: Node<'t>) -> Option<Node<'t>> {
  item
    .children()
    .find(|child| matches!(child.kind(), NodeKind::ListMarker(_)))
}

/// First paragraph inside a list item, breadth-first. Nested lists belong to
/// child items and are not searched.
pub fn first_paragraph<'t>(item: Node<'t>) -> Option<Node<'t>> {
  let mut queue: VecDeque<Node<'t>> = item.children().collect();
  while let Some(node) = queue.pop_front() {
    match node.kind() {
      NodeKind::Paragraph => return Some(node),
      NodeKind::List(_) => {},
      _ => queue.extend(node.children()),
    }
  }
  None
}
