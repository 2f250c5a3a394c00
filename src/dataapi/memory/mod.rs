//! In-process stand-in for the Data API.
//!
//! Holds collections and tables in memory and answers the same commands the
//! HTTP client sends, including paging and `token(...)` range filters. Used by
//! the test suites and by the router tests through `StaticConnector`.

#[cfg(test)]
mod tests;

use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use super::{
    CollectionDefinition, ColumnDefinition, Document, FindPage, FindQuery, TableDefinition,
    VectorDatabase, VectorOptions, WILDCARD_PROJECTION,
};
use crate::source::{COLLECTION_ID_FIELD, SourceKind};
use crate::{ProjectorError, Result};

const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone)]
struct StoredCollection {
    definition: CollectionDefinition,
    documents: Vec<Document>,
    count_fails: bool,
}

#[derive(Debug, Clone)]
struct StoredTable {
    definition: TableDefinition,
    rows: Vec<Document>,
}

#[derive(Debug, Clone)]
pub struct InMemoryDatabase {
    collections: Vec<StoredCollection>,
    tables: Vec<StoredTable>,
    page_size: usize,
    find_log: Arc<Mutex<Vec<FindQuery>>>,
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            tables: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            find_log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl InMemoryDatabase {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add a vector collection; `dimension: None` models a vectorize-only collection
    #[inline]
    #[must_use]
    pub fn with_collection(
        mut self,
        name: &str,
        dimension: Option<usize>,
        documents: Vec<Document>,
    ) -> Self {
        self.collections.push(StoredCollection {
            definition: CollectionDefinition {
                name: name.to_string(),
                vector: Some(VectorOptions {
                    dimension,
                    vectorize: dimension.is_none(),
                }),
            },
            documents,
            count_fails: false,
        });
        self
    }

    /// Add a collection without any vector configuration
    #[inline]
    #[must_use]
    pub fn with_plain_collection(mut self, name: &str, documents: Vec<Document>) -> Self {
        self.collections.push(StoredCollection {
            definition: CollectionDefinition {
                name: name.to_string(),
                vector: None,
            },
            documents,
            count_fails: false,
        });
        self
    }

    /// Make `estimatedDocumentCount` fail for the named collection
    #[inline]
    #[must_use]
    pub fn with_failing_count(mut self, name: &str) -> Self {
        for collection in &mut self.collections {
            if collection.definition.name == name {
                collection.count_fails = true;
            }
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn with_table(mut self, definition: TableDefinition, rows: Vec<Document>) -> Self {
        self.tables.push(StoredTable { definition, rows });
        self
    }

    /// Every `find` query received so far, in order
    #[inline]
    pub fn find_queries(&self) -> Vec<FindQuery> {
        self.find_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn rows(&self, kind: SourceKind, name: &str) -> Result<(&[Document], Vec<String>)> {
        let not_found = || ProjectorError::SourceNotFound {
            kind,
            name: name.to_string(),
        };

        match kind {
            SourceKind::Collection => self
                .collections
                .iter()
                .find(|c| c.definition.name == name)
                .map(|c| (c.documents.as_slice(), vec![COLLECTION_ID_FIELD.to_string()]))
                .ok_or_else(not_found),
            SourceKind::Table => self
                .tables
                .iter()
                .find(|t| t.definition.name == name)
                .map(|t| (t.rows.as_slice(), t.definition.partition_by.clone()))
                .ok_or_else(not_found),
        }
    }
}

/// Token of a row's partition key, mirroring a partitioner's signed 64-bit ring
#[inline]
pub fn partition_token(row: &Document, partition_keys: &[String]) -> i64 {
    let mut hasher = DefaultHasher::new();
    for key in partition_keys {
        row.get(key)
            .map(Value::to_string)
            .unwrap_or_default()
            .hash(&mut hasher);
    }
    i64::from_ne_bytes(hasher.finish().to_ne_bytes())
}

/// Bounds of a `{"token(..)": {"$gte": a, "$lt": b}}` filter, if present
fn token_bounds(filter: &Document) -> Option<(i128, i128)> {
    let (key, condition) = filter.iter().next()?;
    if !key.starts_with("token(") {
        return None;
    }

    let bound = |op: &str| -> Option<i128> {
        let value = condition.get(op)?;
        value
            .as_i64()
            .map(i128::from)
            .or_else(|| value.as_u64().map(i128::from))
    };

    Some((
        bound("$gte").unwrap_or(i128::from(i64::MIN)),
        bound("$lt").unwrap_or(i128::from(i64::MAX) + 1),
    ))
}

fn matches_filter(row: &Document, filter: &Document, partition_keys: &[String]) -> bool {
    if filter.is_empty() {
        return true;
    }

    if let Some((low, high)) = token_bounds(filter) {
        let token = i128::from(partition_token(row, partition_keys));
        return token >= low && token < high;
    }

    filter
        .iter()
        .all(|(field, expected)| row.get(field) == Some(expected))
}

fn project(row: &Document, projection: Option<&Document>, kind: SourceKind) -> Document {
    let Some(projection) = projection else {
        return row.clone();
    };
    if projection.contains_key(WILDCARD_PROJECTION) {
        return row.clone();
    }

    row.iter()
        .filter(|(field, _)| {
            projection.contains_key(field.as_str())
                || (kind == SourceKind::Collection && field.as_str() == COLLECTION_ID_FIELD)
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

impl VectorDatabase for InMemoryDatabase {
    fn list_collections(&self) -> Result<Vec<CollectionDefinition>> {
        Ok(self
            .collections
            .iter()
            .map(|c| c.definition.clone())
            .collect())
    }

    fn list_tables(&self) -> Result<Vec<TableDefinition>> {
        Ok(self.tables.iter().map(|t| t.definition.clone()).collect())
    }

    fn estimated_count(&self, collection: &str) -> Result<Option<u64>> {
        let stored = self
            .collections
            .iter()
            .find(|c| c.definition.name == collection)
            .ok_or_else(|| ProjectorError::SourceNotFound {
                kind: SourceKind::Collection,
                name: collection.to_string(),
            })?;

        if stored.count_fails {
            return Err(ProjectorError::Upstream(
                "estimatedDocumentCount failed".to_string(),
            ));
        }

        Ok(u64::try_from(stored.documents.len()).ok())
    }

    fn find(&self, kind: SourceKind, name: &str, query: &FindQuery) -> Result<FindPage> {
        if let Ok(mut log) = self.find_log.lock() {
            log.push(query.clone());
        }

        let (rows, partition_keys) = self.rows(kind, name)?;
        let matching: Vec<&Document> = rows
            .iter()
            .filter(|row| matches_filter(row, &query.filter, &partition_keys))
            .collect();

        let start = match &query.page_state {
            Some(state) => state.parse::<usize>().map_err(|_| {
                ProjectorError::Upstream(format!("Invalid page state '{}'", state))
            })?,
            None => 0,
        };
        let cap = query.limit.map_or(matching.len(), |limit| limit.min(matching.len()));
        let end = (start + self.page_size).min(cap);

        let documents = matching
            .get(start.min(end)..end)
            .unwrap_or_default()
            .iter()
            .map(|row| project(row, query.projection.as_ref(), kind))
            .collect();

        Ok(FindPage {
            documents,
            next_page_state: (end < cap).then(|| end.to_string()),
        })
    }
}

/// Table definition helper for fixtures: text columns plus one vector column
#[inline]
pub fn table_definition(
    name: &str,
    primary_key: &[&str],
    vector_column: &str,
    dimension: usize,
    text_columns: &[&str],
) -> TableDefinition {
    let mut columns: Vec<ColumnDefinition> = primary_key
        .iter()
        .chain(text_columns)
        .map(|column| ColumnDefinition {
            name: (*column).to_string(),
            column_type: "text".to_string(),
            dimension: None,
        })
        .collect();
    columns.push(ColumnDefinition {
        name: vector_column.to_string(),
        column_type: "vector".to_string(),
        dimension: Some(dimension),
    });

    TableDefinition {
        name: name.to_string(),
        columns,
        partition_by: primary_key.iter().map(|key| (*key).to_string()).collect(),
        partition_sort: Vec::new(),
    }
}
