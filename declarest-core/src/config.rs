//! Immutable runtime configuration.
//!
//! A [`Config`] is supplied once when a requester is constructed and is then
//! shared read-only by every template of the stream. Cloning is cheap, and the
//! underlying mapping is never mutated, so one config can be used from any
//! number of threads at once.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::CoreError;

/// The opaque key-value mapping templates evaluate against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    values: Arc<Map<String, Value>>,
}

impl Config {
    /// Creates an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config from any JSON value.
    ///
    /// `null` is treated as an empty config. Anything other than an object
    /// or `null` is rejected.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(values) => Ok(Self::from(values)),
            Value::Null => Ok(Self::default()),
            other => Err(CoreError::InvalidConfig(format!(
                "config must be a JSON object, got {}",
                value_kind(&other)
            ))),
        }
    }

    /// Parses a config from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Looks up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the whole mapping.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns true if the config has no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for Config {
    fn from(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
