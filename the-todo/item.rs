//! The todo item model produced by discovery.

use std::collections::HashMap;

use serde::{
  Deserialize,
  Serialize,
};

pub use crate::tree::ListMarkerType;
use crate::{
  anchor::AnchorId,
  metadata::Metadata,
  position::{
    Position,
    TextRange,
  },
};

pub type ItemId = AnchorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
  Incomplete,
  Complete,
  Inactive,
}

/// A configured todo state.
///
/// `markdown` is the text between the brackets of the bracket-style token,
/// so `" "` matches `[ ]`. `marker` is the symbolic spelling (`□`, `✔`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoState {
  pub name:       String,
  pub markdown:   String,
  pub marker:     String,
  #[serde(rename = "type")]
  pub state_type: StateType,
  /// Other bracket contents accepted as this state, e.g. `X` for `x`.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub alternates: Vec<String>,
}

impl TodoState {
  pub fn new(name: &str, markdown: &str, marker: &str, state_type: StateType) -> Self {
    Self {
      name: name.to_owned(),
      markdown: markdown.to_owned(),
      marker: marker.to_owned(),
      state_type,
      alternates: Vec::new(),
    }
  }

  pub fn with_alternates<I, S>(mut self, alternates: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.alternates = alternates.into_iter().map(Into::into).collect();
    self
  }

  /// The bracket token written for this state, e.g. `[x]`.
  pub fn bracket_token(&self) -> String {
    format!("[{}]", self.markdown)
  }

  fn tokens(&self) -> impl Iterator<Item = (String, MarkerStyle)> + '_ {
    std::iter::once(&self.markdown)
      .chain(&self.alternates)
      .map(|inner| (format!("[{inner}]"), MarkerStyle::Bracket))
      .chain(
        (!self.marker.is_empty()).then(|| (self.marker.clone(), MarkerStyle::Symbol)),
      )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerStyle {
  Bracket,
  Symbol,
}

/// A todo token found on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMatch<'s> {
  pub state: &'s TodoState,
  pub style: MarkerStyle,
  /// Byte column of the token.
  pub col:   usize,
  pub text:  String,
}

impl StateMatch<'_> {
  pub fn end_col(&self) -> usize {
    self.col + self.text.len()
  }
}

/// The ordered set of configured todo states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoStates {
  states: Vec<TodoState>,
}

impl TodoStates {
  pub fn new(states: Vec<TodoState>) -> Self {
    Self { states }
  }

  pub fn iter(&self) -> impl Iterator<Item = &TodoState> {
    self.states.iter()
  }

  pub fn get(&self, name: &str) -> Option<&TodoState> {
    self.states.iter().find(|state| state.name == name)
  }

  /// Match a todo token at byte `col` of `line`. The token has to be
  /// followed by whitespace or the end of the line. Longer tokens win.
  pub fn match_at(&self, line: &str, col: usize) -> Option<StateMatch<'_>> {
    let rest = line.get(col..)?;
    self
      .states
      .iter()
      .flat_map(|state| state.tokens().map(move |(token, style)| (state, token, style)))
      .filter(|(_, token, _)| {
        rest
          .strip_prefix(token.as_str())
          .is_some_and(|after| after.is_empty() || after.starts_with(char::is_whitespace))
      })
      .max_by_key(|(_, token, _)| token.len())
      .map(|(state, text, style)| StateMatch {
        state,
        style,
        col,
        text,
      })
  }
}

/// Semantic span of an item. `end.row` is inclusive, `end.col` exclusive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRange {
  pub start: Position,
  pub end:   Position,
}

impl ItemRange {
  pub const fn new(start: Position, end: Position) -> Self {
    Self { start, end }
  }

  /// First row after the item, for APIs that take exclusive row ranges.
  pub const fn end_row_exclusive(&self) -> usize {
    self.end.row + 1
  }

  pub const fn contains_row(&self, row: usize) -> bool {
    self.start.row <= row && row <= self.end.row
  }

  pub const fn line_count(&self) -> usize {
    self.end.row + 1 - self.start.row
  }
}

impl From<ItemRange> for TextRange {
  fn from(range: ItemRange) -> Self {
    TextRange::new(range.start, range.end)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
  pub id:                  ItemId,
  pub state:               String,
  pub state_type:          StateType,
  pub range:               ItemRange,
  pub raw_range:           TextRange,
  pub first_content_range: TextRange,
  pub marker_position:     Position,
  pub marker_text:         String,
  pub marker_style:        MarkerStyle,
  pub list_marker_type:    ListMarkerType,
  pub list_marker_text:    String,
  /// First-line text after the todo marker, trimmed.
  pub todo_text:           String,
  pub metadata:            Metadata,
  pub children:            Vec<ItemId>,
  pub parent_id:           Option<ItemId>,
}

impl Item {
  pub fn is_complete(&self) -> bool {
    self.state_type == StateType::Complete
  }

  /// Span of the todo token on the marker row.
  pub fn marker_range(&self) -> TextRange {
    let end = Position::new(
      self.marker_position.row,
      self.marker_position.col + self.marker_text.len(),
    );
    TextRange::new(self.marker_position, end)
  }

  /// Leading whitespace width of the first line.
  pub fn indent(&self) -> usize {
    self.range.start.col
  }
}

/// Items of one document keyed by id, with document order preserved.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ItemMap {
  items: HashMap<ItemId, Item>,
  order: Vec<ItemId>,
}

impl ItemMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn get(&self, id: ItemId) -> Option<&Item> {
    self.items.get(&id)
  }

  pub fn contains(&self, id: ItemId) -> bool {
    self.items.contains_key(&id)
  }

  /// Ids in document order.
  pub fn ids(&self) -> &[ItemId] {
    &self.order
  }

  /// Items in document order.
  pub fn iter(&self) -> impl Iterator<Item = &Item> {
    self.order.iter().filter_map(|id| self.items.get(id))
  }

  pub fn roots(&self) -> impl Iterator<Item = &Item> {
    self.iter().filter(|item| item.parent_id.is_none())
  }

  pub fn children(&self, id: ItemId) -> impl Iterator<Item = &Item> {
    self
      .get(id)
      .into_iter()
      .flat_map(|item| item.children.iter())
      .filter_map(|child| self.items.get(child))
  }

  pub fn parent(&self, id: ItemId) -> Option<&Item> {
    self.get(id)?.parent_id.and_then(|parent| self.get(parent))
  }

  /// Innermost item whose semantic range covers `row`.
  pub fn item_at_row(&self, row: usize) -> Option<&Item> {
    self
      .iter()
      .filter(|item| item.range.contains_row(row))
      .max_by_key(|item| item.range.start)
  }

  pub(crate) fn insert(&mut self, item: Item) {
    let id = item.id;
    if self.items.insert(id, item).is_none() {
      self.order.push(id);
    }
  }

  pub(crate) fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
    self.items.get_mut(&id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn states() -> TodoStates {
    TodoStates::new(vec![
      TodoState::new("unchecked", " ", "□", StateType::Incomplete),
      TodoState::new("checked", "x", "✔", StateType::Complete).with_alternates(["X"]),
      TodoState::new("cancelled", "-", "", StateType::Inactive),
    ])
  }

  #[test]
  fn bracket_and_symbol_tokens_match() {
    let states = states();

    let found = states.match_at("- [ ] milk", 2).unwrap();
    assert_eq!(found.state.name, "unchecked");
    assert_eq!(found.style, MarkerStyle::Bracket);
    assert_eq!(found.end_col(), 5);

    let found = states.match_at("- [X] milk", 2).unwrap();
    assert_eq!(found.state.name, "checked");
    assert_eq!(found.text, "[X]");

    let found = states.match_at("- ✔ milk", 2).unwrap();
    assert_eq!(found.state.name, "checked");
    assert_eq!(found.style, MarkerStyle::Symbol);
    assert_eq!(found.end_col(), 5);

    assert_eq!(states.match_at("- [-]", 2).unwrap().state.state_type, StateType::Inactive);
  }

  #[test]
  fn tokens_need_a_boundary() {
    let states = states();
    assert!(states.match_at("- [ ]milk", 2).is_none());
    assert!(states.match_at("- [y] milk", 2).is_none());
    assert!(states.match_at("- milk", 2).is_none());
    assert!(states.match_at("- ", 9).is_none());
  }

  #[test]
  fn item_range_rows() {
    let range = ItemRange::new(Position::new(2, 2), Position::new(4, 7));
    assert_eq!(range.end_row_exclusive(), 5);
    assert_eq!(range.line_count(), 3);
    assert!(range.contains_row(2));
    assert!(range.contains_row(4));
    assert!(!range.contains_row(5));
  }

  #[test]
  fn item_range_deserializes() {
    let range: ItemRange =
      toml::from_str("start = { row = 0, col = 2 }\nend = { row = 1, col = 4 }").unwrap();
    assert_eq!(range, ItemRange::new(Position::new(0, 2), Position::new(1, 4)));
    assert_eq!(range.end_row_exclusive(), 2);
  }
}
