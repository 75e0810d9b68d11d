// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Pipeline context
//!
//! The key/value record threaded through a pipeline run. A `Context` is a
//! value: every update returns a new context and leaves the original alone,
//! so an observer can hold on to a snapshot while the executor moves on.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{CuraflowError, CuraflowResult};

/// Immutable, append-style mapping from context key to string value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: BTreeMap<String, String>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a flat JSON object of strings
    pub fn from_json(json: &str) -> CuraflowResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Build a context from a flat YAML mapping of strings
    pub fn from_yaml(yaml: &str) -> CuraflowResult<Self> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> CuraflowResult<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(CuraflowError::InvalidContext {
                reason: "expected an object at the top level".into(),
            });
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            let value = match value {
                serde_json::Value::String(s) => s,
                // Scalars are accepted and stored in their textual form
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null => String::new(),
                _ => {
                    return Err(CuraflowError::InvalidContext {
                        reason: format!("value of '{}' is not a scalar", key),
                    })
                }
            };
            entries.insert(key, value);
        }

        Ok(Self { entries })
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> CuraflowResult<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| CuraflowError::ContextKeyNotFound {
                key: key.to_string(),
            })
    }

    /// Check whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Return a new context with `key` set to `value`
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(key.into(), value.into());
        Self { entries }
    }

    /// Return a new context with every pair of `values` applied
    #[must_use]
    pub fn merge<I, K, V>(&self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries = self.entries.clone();
        for (key, value) in values {
            entries.insert(key.into(), value.into());
        }
        Self { entries }
    }

    /// All keys, in order
    pub fn keys(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterate over `(key, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as a pretty JSON document
    pub fn to_json_pretty(&self) -> CuraflowResult<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Context {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new().merge(iter)
    }
}
