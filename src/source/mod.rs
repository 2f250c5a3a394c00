//! Connection and source descriptors shared by every pipeline step.
//!
//! A source is either a document collection or a table. Collections always
//! carry their vector in the reserved `$vector` field and are keyed by `_id`;
//! tables name their vector column explicitly and carry their own primary key.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use url::Url;

use crate::{ProjectorError, Result};

pub const DEFAULT_KEYSPACE: &str = "default_keyspace";
pub const COLLECTION_VECTOR_FIELD: &str = "$vector";
pub const COLLECTION_ID_FIELD: &str = "_id";

/// Endpoint and credentials for one Data API database.
///
/// Lives for a single request or CLI session and is never written to disk.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub endpoint_url: String,
    pub token: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub keyspace: Option<String>,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("endpoint_url", &self.endpoint_url)
            .field("token", &"<redacted>")
            .field("db_name", &self.db_name)
            .field("keyspace", &self.keyspace)
            .finish()
    }
}

impl ConnectionInfo {
    #[inline]
    pub fn new(endpoint_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            token: token.into(),
            db_name: String::new(),
            keyspace: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    /// Keyspace to address, falling back to `default_keyspace` when unset or blank
    #[inline]
    pub fn keyspace(&self) -> &str {
        match self.keyspace.as_deref().map(str::trim) {
            Some(keyspace) if !keyspace.is_empty() => keyspace,
            _ => DEFAULT_KEYSPACE,
        }
    }

    /// Check the descriptor and return the parsed endpoint
    #[inline]
    pub fn validate(&self) -> Result<Url> {
        if self.token.trim().is_empty() {
            return Err(ProjectorError::validation("An application token is required"));
        }

        let endpoint = self.endpoint_url.trim();
        if endpoint.is_empty() {
            return Err(ProjectorError::validation("A Data API endpoint URL is required"));
        }

        let url = Url::parse(endpoint).map_err(|e| {
            ProjectorError::validation(format!("Invalid endpoint URL '{}': {}", endpoint, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ProjectorError::validation(format!(
                "Endpoint URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        Ok(url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Collection,
    Table,
}

impl SourceKind {
    #[inline]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Collection => "collections",
            Self::Table => "tables",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection => f.write_str("Collection"),
            Self::Table => f.write_str("Table"),
        }
    }
}

/// Row count estimate attached to an enumerated source.
///
/// Serialized as a bare number, or as `"N/A"` / `"Error"` when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatedCount {
    Known(u64),
    NotAvailable,
    Error,
}

impl fmt::Display for EstimatedCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(count) => write!(f, "{}", count),
            Self::NotAvailable => f.write_str("N/A"),
            Self::Error => f.write_str("Error"),
        }
    }
}

impl Serialize for EstimatedCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Known(count) => serializer.serialize_u64(*count),
            Self::NotAvailable => serializer.serialize_str("N/A"),
            Self::Error => serializer.serialize_str("Error"),
        }
    }
}

impl<'de> Deserialize<'de> for EstimatedCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u64),
            Label(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Count(count) => Self::Known(count),
            Raw::Label(label) if label == "Error" => Self::Error,
            Raw::Label(_) => Self::NotAvailable,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub name: String,
    pub dimension: usize,
    pub count: EstimatedCount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorColumn {
    pub name: String,
    pub dimension: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub vector_columns: Vec<VectorColumn>,
    pub primary_key_columns: Vec<String>,
    #[serde(default)]
    pub partition_key_columns: Vec<String>,
    pub count: EstimatedCount,
}

impl TableDescriptor {
    #[inline]
    pub fn vector_column(&self, name: &str) -> Option<&VectorColumn> {
        self.vector_columns.iter().find(|column| column.name == name)
    }

    /// Partition key columns, or the primary key when none were reported
    #[inline]
    pub fn partition_keys(&self) -> &[String] {
        if self.partition_key_columns.is_empty() {
            &self.primary_key_columns
        } else {
            &self.partition_key_columns
        }
    }

    /// Reference to this table with the given vector column selected
    #[inline]
    pub fn source_ref(&self, vector_column: &str) -> SourceRef {
        SourceRef::Table {
            name: self.name.clone(),
            vector_column: vector_column.to_string(),
            primary_key_columns: self.primary_key_columns.clone(),
            partition_key_columns: self.partition_keys().to_vec(),
        }
    }
}

/// The source a sampling or materialization request addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceRef {
    Collection {
        name: String,
    },
    Table {
        name: String,
        vector_column: String,
        #[serde(default)]
        primary_key_columns: Vec<String>,
        #[serde(default)]
        partition_key_columns: Vec<String>,
    },
}

impl SourceRef {
    #[inline]
    pub fn collection(name: impl Into<String>) -> Self {
        Self::Collection { name: name.into() }
    }

    #[inline]
    pub fn name(&self) -> &str {
        match self {
            Self::Collection { name } | Self::Table { name, .. } => name,
        }
    }

    #[inline]
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::Collection { .. } => SourceKind::Collection,
            Self::Table { .. } => SourceKind::Table,
        }
    }

    /// Field that holds each row's vector
    #[inline]
    pub fn vector_field(&self) -> &str {
        match self {
            Self::Collection { .. } => COLLECTION_VECTOR_FIELD,
            Self::Table { vector_column, .. } => vector_column,
        }
    }

    /// Columns identifying a row; always emitted in the metadata artifact
    #[inline]
    pub fn key_columns(&self) -> Vec<&str> {
        match self {
            Self::Collection { .. } => vec![COLLECTION_ID_FIELD],
            Self::Table {
                primary_key_columns,
                ..
            } => primary_key_columns.iter().map(String::as_str).collect(),
        }
    }

    /// Partition key columns of a table, falling back to its primary key
    #[inline]
    pub fn partition_keys(&self) -> &[String] {
        match self {
            Self::Collection { .. } => &[],
            Self::Table {
                primary_key_columns,
                partition_key_columns,
                ..
            } => {
                if partition_key_columns.is_empty() {
                    primary_key_columns
                } else {
                    partition_key_columns
                }
            }
        }
    }

    /// Reject incomplete selections before anything touches the database
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(ProjectorError::validation(format!(
                "A {} name is required",
                self.kind().to_string().to_lowercase()
            )));
        }

        if let Self::Table {
            vector_column,
            primary_key_columns,
            ..
        } = self
        {
            if vector_column.trim().is_empty() {
                return Err(ProjectorError::validation(
                    "A vector column must be selected for table sources",
                ));
            }
            if primary_key_columns.is_empty() {
                return Err(ProjectorError::validation(
                    "primary_key_columns are required for table sources",
                ));
            }
        }

        Ok(())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection { name } => write!(f, "collection '{}'", name),
            Self::Table {
                name,
                vector_column,
                ..
            } => write!(f, "table '{}' (vector column '{}')", name, vector_column),
        }
    }
}
