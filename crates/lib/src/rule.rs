//! Rule records produced by build files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConfigReadLog;
use crate::deps::DependencySet;

/// Field every rule must carry.
pub const NAME_KEY: &str = "name";
/// Field set by rule functions to the rule's type.
pub const TYPE_KEY: &str = "trellis.type";
/// Field set by the engine to the build file's directory relative to the root.
pub const BASE_PATH_KEY: &str = "trellis.base_path";

/// One declared build rule: an open string-keyed mapping of JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rule(BTreeMap<String, Value>);

impl Rule {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn name(&self) -> Option<&str> {
    self.0.get(NAME_KEY).and_then(Value::as_str)
  }

  pub fn rule_type(&self) -> Option<&str> {
    self.0.get(TYPE_KEY).and_then(Value::as_str)
  }

  pub fn base_path(&self) -> Option<&str> {
    self.0.get(BASE_PATH_KEY).and_then(Value::as_str)
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.0.contains_key(key)
  }

  pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
    self.0.insert(key.into(), value)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
    self.0.iter()
  }
}

impl From<BTreeMap<String, Value>> for Rule {
  fn from(fields: BTreeMap<String, Value>) -> Self {
    Rule(fields)
  }
}

/// One element of an evaluation result.
///
/// A successful evaluation yields every rule in declaration order, followed by
/// exactly one [`Entry::Includes`] and one [`Entry::Configs`] record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entry {
  Rule(Rule),
  Includes {
    #[serde(rename = "__includes")]
    includes: DependencySet,
  },
  Configs {
    #[serde(rename = "__configs")]
    configs: ConfigReadLog,
  },
}

impl Entry {
  pub fn as_rule(&self) -> Option<&Rule> {
    match self {
      Entry::Rule(rule) => Some(rule),
      _ => None,
    }
  }
}

/// Rules of an evaluation result.
pub fn rules(entries: &[Entry]) -> impl Iterator<Item = &Rule> {
  entries.iter().filter_map(Entry::as_rule)
}

/// The dependency record of an evaluation result.
pub fn includes(entries: &[Entry]) -> Option<&DependencySet> {
  entries.iter().find_map(|entry| match entry {
    Entry::Includes { includes } => Some(includes),
    _ => None,
  })
}

/// The config read record of an evaluation result.
pub fn configs(entries: &[Entry]) -> Option<&ConfigReadLog> {
  entries.iter().find_map(|entry| match entry {
    Entry::Configs { configs } => Some(configs),
    _ => None,
  })
}

/// A rule-declaring builtin registered by the embedding application.
///
/// Calling `<name> { ... }` from a build file declares a rule whose fields are
/// the call's table, with `trellis.type` set to `rule_type` and any missing
/// fields filled from `defaults`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFunction {
  pub name: String,
  pub rule_type: String,
  pub defaults: BTreeMap<String, Value>,
}

impl RuleFunction {
  pub fn new(name: impl Into<String>, rule_type: impl Into<String>) -> Self {
    RuleFunction {
      name: name.into(),
      rule_type: rule_type.into(),
      defaults: BTreeMap::new(),
    }
  }

  pub fn with_default(mut self, field: impl Into<String>, value: Value) -> Self {
    self.defaults.insert(field.into(), value);
    self
  }

  /// Turn call arguments into a rule.
  pub fn apply(&self, mut rule: Rule) -> Rule {
    for (field, value) in &self.defaults {
      if !rule.contains_key(field) {
        rule.insert(field.clone(), value.clone());
      }
    }
    rule.insert(TYPE_KEY, Value::String(self.rule_type.clone()));
    rule
  }
}
