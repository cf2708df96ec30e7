//! Non-fatal notifications for the user: parse failures, failing choice
//! providers and edits that could not run.

use std::collections::VecDeque;

use serde::{
  Deserialize,
  Serialize,
};

pub const DEFAULT_HISTORY_LIMIT: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
  Info,
  Warning,
  Error,
}

/// The part of the todo model a message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
  Discovery,
  Choices,
  Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub seq:    u64,
  pub level:  MessageLevel,
  pub source: MessageSource,
  pub text:   String,
}

#[derive(Debug, Clone)]
pub struct MessageCenter {
  active:        Option<Message>,
  history:       VecDeque<Message>,
  next_seq:      u64,
  history_limit: usize,
}

impl Default for MessageCenter {
  fn default() -> Self {
    Self::with_limit(DEFAULT_HISTORY_LIMIT)
  }
}

impl MessageCenter {
  pub fn with_limit(history_limit: usize) -> Self {
    Self {
      active:        None,
      history:       VecDeque::new(),
      next_seq:      1,
      history_limit: history_limit.max(1),
    }
  }

  /// Latest message not yet dismissed.
  pub fn active(&self) -> Option<&Message> {
    self.active.as_ref()
  }

  pub fn len(&self) -> usize {
    self.history.len()
  }

  pub fn is_empty(&self) -> bool {
    self.history.is_empty()
  }

  pub fn history(&self) -> impl Iterator<Item = &Message> {
    self.history.iter()
  }

  /// Messages published after `seq`, oldest first.
  pub fn since(&self, seq: u64) -> impl Iterator<Item = &Message> {
    self.history.iter().filter(move |message| message.seq > seq)
  }

  pub fn publish(
    &mut self,
    level: MessageLevel,
    source: MessageSource,
    text: impl Into<String>,
  ) -> Message {
    let message = Message {
      seq: self.next_seq,
      level,
      source,
      text: text.into(),
    };
    self.next_seq = self.next_seq.saturating_add(1);

    // a lower level message never hides a pending higher level one
    if self
      .active
      .as_ref()
      .is_none_or(|active| active.level <= message.level)
    {
      self.active = Some(message.clone());
    }

    self.history.push_back(message.clone());
    while self.history.len() > self.history_limit {
      self.history.pop_front();
    }
    message
  }

  pub fn info(&mut self, source: MessageSource, text: impl Into<String>) -> Message {
    self.publish(MessageLevel::Info, source, text)
  }

  pub fn warning(&mut self, source: MessageSource, text: impl Into<String>) -> Message {
    self.publish(MessageLevel::Warning, source, text)
  }

  pub fn error(&mut self, source: MessageSource, text: impl Into<String>) -> Message {
    self.publish(MessageLevel::Error, source, text)
  }

  pub fn dismiss(&mut self) -> Option<Message> {
    self.active.take()
  }

  pub fn clear(&mut self) {
    self.active = None;
    self.history.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn publish_sets_active() {
    let mut center = MessageCenter::default();
    let seq = center
      .warning(MessageSource::Discovery, "no syntax tree")
      .seq;
    assert_eq!(center.active().map(|m| m.seq), Some(seq));
    assert_eq!(center.len(), 1);

    assert!(center.dismiss().is_some());
    assert!(center.active().is_none());
    assert_eq!(center.len(), 1);
  }

  #[test]
  fn history_limit_is_enforced() {
    let mut center = MessageCenter::with_limit(2);
    center.info(MessageSource::Edit, "a");
    center.info(MessageSource::Edit, "b");
    center.info(MessageSource::Edit, "c");
    assert_eq!(center.len(), 2);

    let texts: Vec<_> = center.since(2).map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["c"]);
  }

  #[test]
  fn info_does_not_hide_a_pending_error() {
    let mut center = MessageCenter::default();
    center.error(MessageSource::Choices, "provider failed");
    center.info(MessageSource::Edit, "applied");
    assert_eq!(center.active().unwrap().text, "provider failed");

    center.clear();
    assert!(center.is_empty());
    assert!(center.active().is_none());
  }
}
