//! Hunk builders for common item edits.
//!
//! Everything touching the marker row is expressed as a text hunk so the
//! item's marker anchor, and with it the item id, survives the edit.

use crate::{
  document::Document,
  hunk::Hunk,
  item::{
    Item,
    ListMarkerType,
    MarkerStyle,
    TodoState,
  },
  position::Position,
  registry::MetadataRegistry,
};

/// Rewrite the todo marker to `state`, keeping bracket or symbol style.
pub fn set_state(item: &Item, state: &TodoState) -> Hunk {
  let token = match item.marker_style {
    MarkerStyle::Symbol if !state.marker.is_empty() => state.marker.clone(),
    _ => state.bracket_token(),
  };
  let marker = item.marker_range();
  Hunk::replace_text(marker.start, marker.end, [token])
}

/// Set `tag` to `value`: the value of the item's last entry for the tag is
/// replaced, or a new `@tag(value)` is appended to the first line.
pub fn add_metadata(
  doc: &Document,
  item: &Item,
  registry: &MetadataRegistry,
  tag: &str,
  value: &str,
) -> Option<Hunk> {
  let canonical = registry.canonical(tag);
  if let Some(entry) = item.metadata.get(canonical) {
    let range = entry.value_range;
    return Some(Hunk::replace_text(range.start, range.end, [value]));
  }

  let row = item.marker_position.row;
  let line = doc.line(row)?;
  let at = Position::new(row, line.trim_end().len());
  Some(Hunk::insert_text(at, [format!(" @{tag}({value})")]))
}

/// Remove every entry for `tag` (aliases included) along with the space in
/// front of it.
pub fn remove_metadata(
  doc: &Document,
  item: &Item,
  registry: &MetadataRegistry,
  tag: &str,
) -> Vec<Hunk> {
  let canonical = registry.canonical(tag);
  item
    .metadata
    .all(canonical)
    .map(|entry| {
      let mut start = entry.range.start;
      let preceded_by_space = doc.line(start.row).is_some_and(|line| {
        start
          .col
          .checked_sub(1)
          .is_some_and(|col| line.as_bytes().get(col) == Some(&b' '))
      });
      if preceded_by_space {
        start.col -= 1;
      }
      Hunk::delete_text(start, entry.range.end)
    })
    .collect()
}

/// Insert a sibling todo after the item and everything it owns, reusing its
/// indentation and list marker. Ordered markers count up.
pub fn insert_todo_below(doc: &Document, item: &Item, state: &TodoState, text: &str) -> Hunk {
  let indent = doc
    .line(item.marker_position.row)
    .map(|line| line[..line.len() - line.trim_start().len()].to_owned())
    .unwrap_or_default();
  let list_marker = next_list_marker(item);
  let mut line = format!("{indent}{list_marker} {}", state.bracket_token());
  if !text.is_empty() {
    line.push(' ');
    line.push_str(text);
  }
  Hunk::insert_lines(item.range.end_row_exclusive(), [line])
}

fn next_list_marker(item: &Item) -> String {
  let marker = item.list_marker_text.as_str();
  if item.list_marker_type == ListMarkerType::Unordered {
    return marker.to_owned();
  }
  let digits = marker.trim_end_matches(['.', ')']);
  let delimiter = &marker[digits.len()..];
  match digits.parse::<u64>() {
    Ok(number) => format!("{}{delimiter}", number.saturating_add(1)),
    Err(_) => marker.to_owned(),
  }
}

#[cfg(test)]
mod tests {
  use std::num::NonZeroUsize;

  use ropey::Rope;

  use super::*;
  use crate::{
    config::Config,
    discovery::{
      DiscoveryContext,
      discover,
    },
    document::DocumentId,
    hunk::apply_diff,
    item::{
      ItemMap,
      TodoStates,
    },
    markdown::MarkdownTreeProvider,
    messages::MessageCenter,
  };

  struct Env {
    doc:      Document,
    states:   TodoStates,
    registry: MetadataRegistry,
  }

  impl Env {
    fn new(text: &str) -> Self {
      let config = Config::default();
      Self {
        doc:      Document::new(DocumentId::new(NonZeroUsize::MIN), Rope::from(text)),
        states:   config.todo_states(),
        registry: config.registry().unwrap(),
      }
    }

    fn items(&mut self) -> ItemMap {
      let provider = MarkdownTreeProvider::new();
      let cx = DiscoveryContext {
        states:   &self.states,
        registry: &self.registry,
        provider: &provider,
      };
      discover(&mut self.doc, &cx, &mut MessageCenter::default()).items
    }

    fn first(&mut self) -> Item {
      self.items().iter().next().cloned().unwrap()
    }

    fn text(&self) -> String {
      self.doc.text().to_string()
    }
  }

  #[test]
  fn set_state_keeps_the_item_id() {
    let mut env = Env::new("- [ ] milk\n- ✔ eggs\n");
    let items = env.items();
    let ids: Vec<_> = items.ids().to_vec();
    let checked = env.states.get("checked").unwrap().clone();
    let unchecked = env.states.get("unchecked").unwrap().clone();

    let hunks: Vec<_> = items
      .iter()
      .map(|item| {
        let state = if item.is_complete() { &unchecked } else { &checked };
        set_state(item, state)
      })
      .collect();
    apply_diff(&mut env.doc, hunks).unwrap();

    assert_eq!(env.text(), "- [x] milk\n- □ eggs\n");
    let after = env.items();
    assert_eq!(after.ids(), ids.as_slice());
    assert!(after.get(ids[0]).unwrap().is_complete());
  }

  #[test]
  fn add_metadata_appends_or_replaces() {
    let mut env = Env::new("- [ ] milk  \n");
    let item = env.first();
    let hunk = add_metadata(&env.doc, &item, &env.registry, "priority", "high").unwrap();
    apply_diff(&mut env.doc, [hunk]).unwrap();
    assert_eq!(env.text(), "- [ ] milk @priority(high)  \n");

    let item = env.first();
    let hunk = add_metadata(&env.doc, &item, &env.registry, "p", "low").unwrap();
    apply_diff(&mut env.doc, [hunk]).unwrap();
    assert_eq!(env.text(), "- [ ] milk @priority(low)  \n");
    assert_eq!(env.first().id, item.id);
  }

  #[test]
  fn remove_metadata_takes_aliases_and_spaces() {
    let mut env = Env::new("- [ ] milk @p(high) @due(fri) @priority(low)\n");
    let item = env.first();
    let hunks = remove_metadata(&env.doc, &item, &env.registry, "priority");
    assert_eq!(hunks.len(), 2);
    apply_diff(&mut env.doc, hunks).unwrap();

    assert_eq!(env.text(), "- [ ] milk @due(fri)\n");
    assert_eq!(env.first().id, item.id);
  }

  #[test]
  fn insert_todo_below_skips_owned_lines() {
    let mut env = Env::new("1. [x] first\n   notes\n   - [ ] sub\n2. [ ] second\n");
    let items = env.items();
    let first = items.iter().find(|item| item.todo_text == "first").unwrap().clone();
    let unchecked = env.states.get("unchecked").unwrap().clone();

    let below = insert_todo_below(&env.doc, &first, &unchecked, "new");
    apply_diff(&mut env.doc, [below]).unwrap();
    assert_eq!(
      env.text(),
      "1. [x] first\n   notes\n   - [ ] sub\n2. [ ] new\n2. [ ] second\n"
    );

    let sub = env
      .items()
      .iter()
      .find(|item| item.todo_text == "sub")
      .cloned()
      .unwrap();
    let below = insert_todo_below(&env.doc, &sub, &unchecked, "");
    apply_diff(&mut env.doc, [below]).unwrap();
    assert!(env.text().contains("   - [ ] sub\n   - [ ]\n"));
  }

  #[test]
  fn stale_items_do_not_panic() {
    let mut env = Env::new("- [ ] milk @p(high)\n");
    let item = env.first();
    env.doc.set_lines(0, 1, &["- [ ] x"]).unwrap();
    let hunks = remove_metadata(&env.doc, &item, &env.registry, "priority");
    assert_eq!(hunks.len(), 1);
    let report = apply_diff(&mut env.doc, hunks).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(env.text(), "- [ ] x\n");

    let mut env = Env::new("- [ ] top\n  - [ ] sub\n");
    let items = env.items();
    let sub = items.iter().find(|item| item.todo_text == "sub").unwrap().clone();
    env.doc.set_lines(1, 2, &["日本"]).unwrap();
    let unchecked = env.states.get("unchecked").unwrap().clone();
    let below = insert_todo_below(&env.doc, &sub, &unchecked, "new");
    apply_diff(&mut env.doc, [below]).unwrap();
    assert!(env.text().contains("日本\n- [ ] new"));
  }
}
