//! Metadata tag registry: canonical names, aliases and value choices.
//!
//! Tags without a registration are their own canonical name. Choice
//! providers are user code; they may fail or panic, and both are contained
//! in [`MetadataRegistry::choices`].

use std::{
  collections::HashMap,
  fmt,
  panic::{
    self,
    AssertUnwindSafe,
  },
};

use thiserror::Error;
use tracing::warn;

use crate::{
  config::ConfigError,
  item::Item,
  messages::{
    MessageCenter,
    MessageSource,
  },
};

#[derive(Debug, Error)]
pub enum ChoiceError {
  #[error("{0}")]
  Provider(String),
  #[error("choice provider panicked")]
  Panicked,
}

/// What a provider gets to look at when asked for values.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceContext<'a> {
  /// Canonical tag name.
  pub tag:  &'a str,
  pub item: Option<&'a Item>,
}

pub trait ChoiceProvider {
  fn choices(&self, cx: &ChoiceContext<'_>) -> Result<Vec<String>, ChoiceError>;
}

impl<F> ChoiceProvider for F
where
  F: Fn(&ChoiceContext<'_>) -> Result<Vec<String>, ChoiceError>,
{
  fn choices(&self, cx: &ChoiceContext<'_>) -> Result<Vec<String>, ChoiceError> {
    self(cx)
  }
}

/// A fixed list of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticChoices(Vec<String>);

impl StaticChoices {
  pub fn new(values: Vec<String>) -> Self {
    Self(values)
  }
}

impl ChoiceProvider for StaticChoices {
  fn choices(&self, _cx: &ChoiceContext<'_>) -> Result<Vec<String>, ChoiceError> {
    Ok(self.0.clone())
  }
}

pub struct MetadataSpec {
  pub name:    String,
  pub aliases: Vec<String>,
  choices:     Option<Box<dyn ChoiceProvider>>,
}

impl fmt::Debug for MetadataSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetadataSpec")
      .field("name", &self.name)
      .field("aliases", &self.aliases)
      .field("choices", &self.choices.is_some())
      .finish()
  }
}

impl MetadataSpec {
  pub fn new(name: &str) -> Self {
    Self {
      name:    name.to_owned(),
      aliases: Vec::new(),
      choices: None,
    }
  }

  pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.aliases = aliases.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_choices(mut self, provider: impl ChoiceProvider + 'static) -> Self {
    self.choices = Some(Box::new(provider));
    self
  }

  pub fn has_choices(&self) -> bool {
    self.choices.is_some()
  }
}

#[derive(Debug, Default)]
pub struct MetadataRegistry {
  specs:  Vec<MetadataSpec>,
  // name or alias -> spec index
  lookup: HashMap<String, usize>,
}

impl MetadataRegistry {
  pub fn register(&mut self, spec: MetadataSpec) -> Result<(), ConfigError> {
    let idx = self.specs.len();
    let keys: Vec<&String> = std::iter::once(&spec.name).chain(&spec.aliases).collect();
    for (i, key) in keys.iter().enumerate() {
      if self.lookup.contains_key(key.as_str()) || keys[..i].contains(key) {
        return Err(ConfigError::DuplicateMetadata((*key).clone()));
      }
    }
    for key in keys {
      self.lookup.insert(key.clone(), idx);
    }
    self.specs.push(spec);
    Ok(())
  }

  pub fn get(&self, tag: &str) -> Option<&MetadataSpec> {
    self.lookup.get(tag).map(|&idx| &self.specs[idx])
  }

  /// Canonical name of a tag or alias; unknown tags map to themselves.
  pub fn canonical<'a>(&'a self, tag: &'a str) -> &'a str {
    self.get(tag).map_or(tag, |spec| spec.name.as_str())
  }

  pub fn is_alias(&self, tag: &str) -> bool {
    self.canonical(tag) != tag
  }

  pub fn specs(&self) -> impl Iterator<Item = &MetadataSpec> {
    self.specs.iter()
  }

  /// Ask the tag's provider for values. Failures are reported to `messages`
  /// and produce no choices.
  pub fn choices(
    &self,
    tag: &str,
    item: Option<&Item>,
    messages: &mut MessageCenter,
  ) -> Vec<String> {
    let Some(spec) = self.get(tag) else {
      return Vec::new();
    };
    let Some(provider) = spec.choices.as_deref() else {
      return Vec::new();
    };

    let cx = ChoiceContext {
      tag: &spec.name,
      item,
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| provider.choices(&cx)))
      .unwrap_or(Err(ChoiceError::Panicked));
    match result {
      Ok(choices) => choices,
      Err(err) => {
        warn!(tag = spec.name.as_str(), "metadata choice provider failed: {err}");
        messages.warning(
          MessageSource::Choices,
          format!("choices for @{} unavailable: {err}", spec.name),
        );
        Vec::new()
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::messages::MessageLevel;

  #[test]
  fn aliases_resolve_to_canonical_names() {
    let mut registry = MetadataRegistry::default();
    registry
      .register(MetadataSpec::new("done").with_aliases(["completed"]))
      .unwrap();

    assert_eq!(registry.canonical("completed"), "done");
    assert_eq!(registry.canonical("done"), "done");
    assert_eq!(registry.canonical("custom"), "custom");
    assert!(registry.is_alias("completed"));
    assert!(!registry.is_alias("custom"));
  }

  #[test]
  fn duplicate_keys_are_rejected() {
    let mut registry = MetadataRegistry::default();
    registry
      .register(MetadataSpec::new("priority").with_aliases(["p"]))
      .unwrap();
    assert!(registry.register(MetadataSpec::new("p")).is_err());
    assert!(
      registry
        .register(MetadataSpec::new("due").with_aliases(["d", "d"]))
        .is_err()
    );
    assert_eq!(registry.specs().count(), 1);
    assert_eq!(registry.canonical("d"), "d");
  }

  #[test]
  fn providers_answer_for_aliases() {
    let mut registry = MetadataRegistry::default();
    registry
      .register(
        MetadataSpec::new("priority")
          .with_aliases(["p"])
          .with_choices(StaticChoices::new(vec!["high".into(), "low".into()])),
      )
      .unwrap();
    let mut messages = MessageCenter::default();

    assert_eq!(registry.choices("p", None, &mut messages), vec!["high", "low"]);
    assert!(registry.choices("unknown", None, &mut messages).is_empty());
    assert!(messages.is_empty());
  }

  #[test]
  fn failing_providers_are_contained() {
    let mut registry = MetadataRegistry::default();
    registry
      .register(MetadataSpec::new("failing").with_choices(
        |_: &ChoiceContext<'_>| -> Result<Vec<String>, ChoiceError> {
          Err(ChoiceError::Provider("offline".into()))
        },
      ))
      .unwrap();
    registry
      .register(MetadataSpec::new("panicking").with_choices(
        |cx: &ChoiceContext<'_>| -> Result<Vec<String>, ChoiceError> {
          panic!("no choices for {}", cx.tag)
        },
      ))
      .unwrap();
    let mut messages = MessageCenter::default();

    assert!(registry.choices("failing", None, &mut messages).is_empty());
    assert!(registry.choices("panicking", None, &mut messages).is_empty());
    assert_eq!(messages.len(), 2);
    assert_eq!(messages.active().unwrap().level, MessageLevel::Warning);
    assert!(messages.active().unwrap().text.contains("panicked"));
  }
}
