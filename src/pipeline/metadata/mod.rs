
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

use crate::dataapi::Document;
use crate::{ProjectorError, Result};

/// Strings shorter than this are pre-selected as metadata
pub const DEFAULT_INCLUDE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataKey {
    pub name: String,
    pub default_included: bool,
}

/// Candidate metadata columns, sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataKeySet {
    keys: Vec<MetadataKey>,
}

impl MetadataKeySet {
    #[inline]
    pub fn keys(&self) -> &[MetadataKey] {
        &self.keys
    }

    #[inline]
    pub fn names(&self) -> Vec<&str> {
        self.keys.iter().map(|key| key.name.as_str()).collect()
    }

    /// Keys the heuristic pre-selects
    #[inline]
    pub fn default_selected(&self) -> Vec<&str> {
        self.keys
            .iter()
            .filter(|key| key.default_included)
            .map(|key| key.name.as_str())
            .collect()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.keys.iter().any(|key| key.name == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Collect the union of keys across the sample, minus the vector field.
///
/// Only the first row drives the default selection: a key is pre-selected
/// when its first-row value is a number or a short string.
#[inline]
pub fn extract_keys(sample: &[Document], vector_field: &str) -> Result<MetadataKeySet> {
    let Some(first) = sample.first() else {
        return Err(ProjectorError::EmptySample(
            "the provided sample".to_string(),
        ));
    };

    let names: BTreeSet<&str> = sample
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .filter(|name| *name != vector_field)
        .collect();

    if names.is_empty() {
        return Err(ProjectorError::NoMetadataKeys);
    }

    let keys: Vec<MetadataKey> = names
        .into_iter()
        .map(|name| MetadataKey {
            name: name.to_string(),
            default_included: first.get(name).is_some_and(is_default_included),
        })
        .collect();

    debug!(
        "Extracted {} metadata keys ({} selected by default)",
        keys.len(),
        keys.iter().filter(|key| key.default_included).count()
    );

    Ok(MetadataKeySet { keys })
}

fn is_default_included(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(text) => text.chars().count() < DEFAULT_INCLUDE_MAX_CHARS,
        _ => false,
    }
}
