//! Benchmarks for todo discovery and batched hunks.
//!
//! Run with: `cargo bench -p the-todo --bench discovery`

use std::num::NonZeroUsize;

use divan::{
  Bencher,
  black_box,
};
use ropey::Rope;
use the_todo::{
  config::Config,
  discovery::{
    DiscoveryContext,
    discover,
  },
  document::{
    Document,
    DocumentId,
  },
  hunk::{
    Hunk,
    apply_diff,
  },
  markdown::MarkdownTreeProvider,
  messages::MessageCenter,
  position::Position,
};

fn main() {
  divan::main();
}

/// `sections` blocks of a heading, a parent todo with metadata and a few
/// nested children.
fn make_outline(sections: usize) -> String {
  let mut text = String::new();
  for section in 0..sections {
    text.push_str(&format!("## Section {section}\n\n"));
    text.push_str(&format!(
      "- [ ] task {section} @priority(high) @started(01/01/24 10:00)\n"
    ));
    for child in 0..4 {
      let marker = if child % 2 == 0 { "[ ]" } else { "[x]" };
      text.push_str(&format!("  - {marker} step {child} @p(low)\n"));
    }
    text.push_str("  some notes\n\n");
  }
  text
}

fn make_doc(sections: usize) -> Document {
  Document::new(
    DocumentId::new(NonZeroUsize::MIN),
    Rope::from(make_outline(sections)),
  )
}

mod discovery {
  use super::*;

  #[divan::bench(args = [10, 100, 1000])]
  fn full_pass(bencher: Bencher, sections: usize) {
    let config = Config::default();
    let states = config.todo_states();
    let registry = config.registry().unwrap();
    let provider = MarkdownTreeProvider::new();
    let cx = DiscoveryContext {
      states:   &states,
      registry: &registry,
      provider: &provider,
    };
    let mut doc = make_doc(sections);
    let mut messages = MessageCenter::default();

    bencher.bench_local(|| {
      let found = discover(black_box(&mut doc), &cx, &mut messages);
      black_box(found);
    });
  }
}

mod hunks {
  use super::*;

  #[divan::bench(args = [1, 8, 64])]
  fn toggle_markers(bencher: Bencher, count: usize) {
    // every section is eight rows, its parent todo the third
    let hunks: Vec<Hunk> = (0..count)
      .map(|section| {
        let row = 2 + 8 * section;
        Hunk::replace_text(Position::new(row, 2), Position::new(row, 5), ["[x]"])
      })
      .collect();

    bencher
      .with_inputs(|| (make_doc(64), hunks.clone()))
      .bench_local_values(|(mut doc, hunks)| {
        apply_diff(&mut doc, hunks).unwrap();
        black_box(doc);
      });
  }
}
