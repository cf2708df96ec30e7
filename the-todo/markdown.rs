//! Markdown tree provider built on `pulldown-cmark`'s offset iterator.
//!
//! Block-level tags become nodes; inline tags only extend the enclosing
//! paragraph. Tight list items carry their inline content without a
//! paragraph event, so one is synthesized around it to give every item a
//! first-paragraph node. Task-list syntax is left disabled: `[ ]` stays
//! plain text and is matched against the configured todo states instead.

use std::borrow::Cow;

use pulldown_cmark::{
  Event,
  Options,
  Parser,
  Tag,
};
use ropey::{
  Rope,
  RopeSlice,
};

use crate::tree::{
  ListMarkerType,
  NodeKind,
  SyntaxTree,
  TreeBuilder,
  TreeProvider,
};

#[derive(Debug, Clone, Copy)]
pub struct MarkdownTreeProvider {
  options: Options,
}

impl Default for MarkdownTreeProvider {
  fn default() -> Self {
    Self::new()
  }
}

impl MarkdownTreeProvider {
  pub fn new() -> Self {
    Self {
      options: Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES,
    }
  }
}

impl TreeProvider for MarkdownTreeProvider {
  fn parse(&self, text: &Rope) -> Option<SyntaxTree> {
    let slice = text.slice(..);
    let source: Cow<str> = slice.into();
    Some(build_tree(slice, &source, self.options))
  }
}

struct Frame {
  opens_node: bool,
}

fn block_kind(tag: &Tag) -> Option<NodeKind> {
  let kind = match tag {
    Tag::Paragraph => NodeKind::Paragraph,
    Tag::Heading { .. } => NodeKind::Heading,
    Tag::BlockQuote(_) => NodeKind::BlockQuote,
    Tag::CodeBlock(_) => NodeKind::CodeBlock,
    Tag::List(Some(_)) => NodeKind::List(ListMarkerType::Ordered),
    Tag::List(None) => NodeKind::List(ListMarkerType::Unordered),
    Tag::Item => NodeKind::ListItem,
    Tag::Emphasis
    | Tag::Strong
    | Tag::Strikethrough
    | Tag::Link { .. }
    | Tag::Image { .. } => return None,
    _ => NodeKind::Block,
  };
  Some(kind)
}

fn build_tree(text: RopeSlice, source: &str, options: Options) -> SyntaxTree {
  let mut builder = TreeBuilder::new(text);
  let mut frames: Vec<Frame> = Vec::new();
  // End offset of the synthesized paragraph while it is the open node.
  let mut implicit: Option<usize> = None;

  for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
    match event {
      Event::Start(tag) => {
        let Some(kind) = block_kind(&tag) else {
          extend_inline(&mut builder, &mut implicit, range.clone());
          frames.push(Frame { opens_node: false });
          continue;
        };
        close_implicit(&mut builder, &mut implicit, source);
        match kind {
          NodeKind::ListItem => {
            let start = skip_blank(source, range.start);
            builder.open(NodeKind::ListItem, start);
            if let Some((marker, len)) = list_marker_at(source, start) {
              builder.leaf(NodeKind::ListMarker(marker), start..start + len);
            }
          },
          kind => {
            builder.open(kind, range.start);
          },
        }
        frames.push(Frame { opens_node: true });
      },
      Event::End(_) => {
        let Some(frame) = frames.pop() else {
          continue;
        };
        if !frame.opens_node {
          if let Some(end) = implicit.as_mut() {
            *end = (*end).max(range.end);
          }
          continue;
        }
        close_implicit(&mut builder, &mut implicit, source);
        let end = if builder.current_kind() == NodeKind::Paragraph {
          trim_end(source, range.start, range.end)
        } else {
          range.end
        };
        builder.close(end);
      },
      Event::Rule => {
        close_implicit(&mut builder, &mut implicit, source);
        builder.leaf(NodeKind::Block, range);
      },
      _ => extend_inline(&mut builder, &mut implicit, range),
    }
  }

  close_implicit(&mut builder, &mut implicit, source);
  builder.finish()
}

fn extend_inline(
  builder: &mut TreeBuilder,
  implicit: &mut Option<usize>,
  range: std::ops::Range<usize>,
) {
  match implicit {
    Some(end) => *end = (*end).max(range.end),
    None if builder.current_kind() == NodeKind::ListItem => {
      builder.open(NodeKind::Paragraph, range.start);
      *implicit = Some(range.end);
    },
    None => {},
  }
}

fn close_implicit(builder: &mut TreeBuilder, implicit: &mut Option<usize>, source: &str) {
  if let Some(end) = implicit.take() {
    let start = builder.current_start().unwrap_or(end);
    builder.close(trim_end(source, start, end));
  }
}

/// Item starts may sit on the line break before a tab-indented marker.
fn skip_blank(source: &str, start: usize) -> usize {
  let bytes = source.as_bytes();
  let mut idx = start;
  while idx < bytes.len() && matches!(bytes[idx], b' ' | b'\t' | b'\r' | b'\n') {
    idx += 1;
  }
  idx
}

fn trim_end(source: &str, start: usize, end: usize) -> usize {
  let bytes = source.as_bytes();
  let mut end = end.min(bytes.len());
  while end > start && bytes[end - 1].is_ascii_whitespace() {
    end -= 1;
  }
  end
}

/// Parses a list marker at `start`: `-`, `*`, `+`, or up to nine digits
/// followed by `.` or `)`. Returns the marker type and its byte length.
pub fn list_marker_at(source: &str, start: usize) -> Option<(ListMarkerType, usize)> {
  let rest = source.as_bytes().get(start..)?;
  match rest.first()? {
    b'-' | b'*' | b'+' => Some((ListMarkerType::Unordered, 1)),
    b'0'..=b'9' => {
      let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
      match rest.get(digits) {
        Some(b'.' | b')') if digits <= 9 => Some((ListMarkerType::Ordered, digits + 1)),
        _ => None,
      }
    },
    _ => None,
  }
}
