//! Configuration loaded from a YAML or JSON file.
//!
//! Loading never fails: a missing, unreadable or malformed file yields an
//! empty [`Config`] and a log line, so callers can always fall back to their
//! own defaults.

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::runtime::Runtime;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// A string-keyed configuration mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(Map<String, Value>);

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a config file. Returns an empty config if none can be loaded.
    #[tracing::instrument(skip(runtime))]
    pub fn read<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Self {
        match runtime.read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) => {
                info!(
                    "Failed to load config local file ({}). Proceeding without config. Error: {:#}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Parses config text as YAML or JSON, whichever works.
    pub fn parse(data: &str) -> Self {
        match parse_yaml_or_json(data) {
            Some(Value::Object(map)) => Config(map),
            Some(other) => {
                info!(
                    "Config is not a mapping (found {}). Proceeding without config.",
                    value_kind(&other)
                );
                Self::default()
            }
            None => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserializes the value under `key`. Returns `None` if it is missing or
    /// has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.0.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("Config key {} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Merges `other` into `self`.
    ///
    /// For keys present on both sides, mappings are merged one level deep,
    /// sequences are concatenated, and anything else is replaced by `other`'s
    /// value. Keys only in `other` are inserted.
    pub fn union(&mut self, other: &Config) -> &mut Self {
        for (key, value) in &other.0 {
            let Some(slot) = self.0.get_mut(key) else {
                self.0.insert(key.clone(), value.clone());
                continue;
            };

            match (slot, value) {
                (Value::Object(left), Value::Object(right)) => left.extend(right.clone()),
                (Value::Array(left), Value::Array(right)) => left.extend(right.iter().cloned()),
                (slot, value) => *slot = value.clone(),
            }
        }
        self
    }

    /// Like [`Config::union`], but leaves `self` untouched and returns the result.
    pub fn unioned(&self, other: &Config) -> Config {
        let mut merged = self.clone();
        merged.union(other);
        merged
    }
}

impl From<Map<String, Value>> for Config {
    fn from(map: Map<String, Value>) -> Self {
        Config(map)
    }
}

fn parse_yaml_or_json(data: &str) -> Option<Value> {
    match parse_yaml(data) {
        Ok(value) => return Some(value),
        Err(e) => debug!("Failed to read config as yaml, trying json: {:#}", e),
    }

    match serde_json::from_str::<Value>(data) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Failed to read config as JSON, failed to load any config: {}", e);
            None
        }
    }
}

/// Parses YAML with anchors resolved and `<<` merge keys applied.
fn parse_yaml(data: &str) -> anyhow::Result<Value> {
    let mut value = serde_yaml::from_str::<serde_yaml::Value>(data)?;
    value.apply_merge()?;
    Ok(serde_json::to_value(value)?)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
