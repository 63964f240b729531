//! Free-form plugin options.
//!
//! The core never interprets these; each plugin validates its own keys.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NavError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginOptions(Map<String, Value>);

impl PluginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed lookup. A present key with the wrong shape is a configuration error.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| NavError::ConfigError(format!("option `{}`: {}", key, e))),
        }
    }

    pub fn require<T: DeserializeOwned>(&self, plugin: &str, key: &str) -> Result<T> {
        self.get(key)?.ok_or_else(|| NavError::MissingOption {
            plugin: plugin.to_string(),
            option: key.to_string(),
        })
    }
}

impl From<Map<String, Value>> for PluginOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
