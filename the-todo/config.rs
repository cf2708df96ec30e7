use std::collections::HashSet;

use serde::{
  Deserialize,
  Serialize,
};
use thiserror::Error;

use crate::{
  item::{
    StateType,
    TodoState,
    TodoStates,
  },
  registry::{
    MetadataRegistry,
    MetadataSpec,
    StaticChoices,
  },
};

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to parse todo config: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("at least one todo state must be configured")]
  NoStates,
  #[error("todo state '{0}' is configured more than once")]
  DuplicateState(String),
  #[error("todo marker '{token}' is used by both '{first}' and '{second}'")]
  DuplicateMarker {
    token:  String,
    first:  String,
    second: String,
  },
  #[error("metadata name or alias '{0}' is registered more than once")]
  DuplicateMetadata(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
  pub todo_states: Vec<TodoState>,
  pub metadata:    Vec<MetadataConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataConfig {
  pub name:    String,
  #[serde(default)]
  pub aliases: Vec<String>,
  /// Fixed values offered when picking a value for this tag.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub choices: Vec<String>,
}

impl MetadataConfig {
  fn new(name: &str, aliases: &[&str]) -> Self {
    Self {
      name:    name.to_owned(),
      aliases: aliases.iter().map(|alias| (*alias).to_owned()).collect(),
      choices: Vec::new(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      todo_states: vec![
        TodoState::new("unchecked", " ", "□", StateType::Incomplete),
        TodoState::new("checked", "x", "✔", StateType::Complete).with_alternates(["X"]),
      ],
      metadata:    vec![
        MetadataConfig::new("priority", &["p"]),
        MetadataConfig::new("started", &["init"]),
        MetadataConfig::new("done", &["completed"]),
      ],
    }
  }
}

impl Config {
  pub fn from_toml(source: &str) -> Result<Self> {
    let config: Config = toml::from_str(source)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    if self.todo_states.is_empty() {
      return Err(ConfigError::NoStates);
    }

    let mut names = HashSet::new();
    let mut tokens: Vec<(String, &str)> = Vec::new();
    for state in &self.todo_states {
      if !names.insert(state.name.as_str()) {
        return Err(ConfigError::DuplicateState(state.name.clone()));
      }
      let spellings = std::iter::once(format!("[{}]", state.markdown))
        .chain(state.alternates.iter().map(|alt| format!("[{alt}]")))
        .chain((!state.marker.is_empty()).then(|| state.marker.clone()));
      for token in spellings {
        if let Some((_, first)) = tokens.iter().find(|(seen, _)| *seen == token) {
          return Err(ConfigError::DuplicateMarker {
            token,
            first: (*first).to_owned(),
            second: state.name.clone(),
          });
        }
        tokens.push((token, state.name.as_str()));
      }
    }

    self.registry().map(|_| ())
  }

  pub fn todo_states(&self) -> TodoStates {
    TodoStates::new(self.todo_states.clone())
  }

  pub fn registry(&self) -> Result<MetadataRegistry> {
    let mut registry = MetadataRegistry::default();
    for entry in &self.metadata {
      let mut spec = MetadataSpec::new(&entry.name).with_aliases(entry.aliases.iter().cloned());
      if !entry.choices.is_empty() {
        spec = spec.with_choices(StaticChoices::new(entry.choices.clone()));
      }
      registry.register(spec)?;
    }
    Ok(registry)
  }
}
