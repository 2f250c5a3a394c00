// Data API boundary
// Everything the pipeline needs from the external vector database goes through
// the `VectorDatabase` trait so the steps can run against a fake in tests.

pub mod client;
pub mod memory;

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::Result;
use crate::source::{ConnectionInfo, SourceKind};

pub use client::DataApiClient;
pub use memory::InMemoryDatabase;

/// A document or table row as returned by the Data API
pub type Document = serde_json::Map<String, Value>;

/// Projection field selecting every field, `$vector` included
pub const WILDCARD_PROJECTION: &str = "*";

/// Collection as reported by `findCollections`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDefinition {
    pub name: String,
    pub vector: Option<VectorOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorOptions {
    pub dimension: Option<usize>,
    /// Whether the collection relies on server-side vectorization
    pub vectorize: bool,
}

/// Table as reported by `listTables`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub partition_by: Vec<String>,
    pub partition_sort: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: String,
    pub dimension: Option<usize>,
}

impl ColumnDefinition {
    #[inline]
    pub fn is_vector(&self) -> bool {
        self.column_type.eq_ignore_ascii_case("vector")
    }
}

/// Arguments of a single `find` command
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FindQuery {
    pub filter: Document,
    pub projection: Option<Document>,
    pub limit: Option<usize>,
    pub page_state: Option<String>,
}

impl FindQuery {
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = filter;
        self
    }

    /// Project only the given fields
    #[inline]
    #[must_use]
    pub fn with_projection<'a, I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let projection: Document = fields
            .into_iter()
            .map(|field| (field.to_string(), Value::Bool(true)))
            .collect();
        self.projection = Some(projection);
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_page_state(mut self, page_state: Option<String>) -> Self {
        self.page_state = page_state;
        self
    }
}

/// One page of `find` results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindPage {
    pub documents: Vec<Document>,
    pub next_page_state: Option<String>,
}

/// Operations consumed from the external vector database
pub trait VectorDatabase: Send + Sync {
    fn list_collections(&self) -> Result<Vec<CollectionDefinition>>;

    fn list_tables(&self) -> Result<Vec<TableDefinition>>;

    /// Estimated document count, `None` when the server did not report one
    fn estimated_count(&self, collection: &str) -> Result<Option<u64>>;

    fn find(&self, kind: SourceKind, name: &str, query: &FindQuery) -> Result<FindPage>;
}

/// Opens a database handle for one request's connection descriptor
pub trait Connector: Send + Sync {
    fn connect(&self, info: &ConnectionInfo) -> Result<Box<dyn VectorDatabase>>;
}

/// Connector producing HTTP clients against the real Data API
#[derive(Debug, Clone, Copy)]
pub struct DataApiConnector {
    timeout: Duration,
}

impl DataApiConnector {
    #[inline]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for DataApiConnector {
    fn connect(&self, info: &ConnectionInfo) -> Result<Box<dyn VectorDatabase>> {
        let client = DataApiClient::new(info)?.with_timeout(self.timeout);
        Ok(Box::new(client))
    }
}

/// Connector that hands out clones of a fixed in-memory database
#[derive(Debug, Clone, Default)]
pub struct StaticConnector {
    database: InMemoryDatabase,
}

impl StaticConnector {
    #[inline]
    pub const fn new(database: InMemoryDatabase) -> Self {
        Self { database }
    }
}

impl Connector for StaticConnector {
    fn connect(&self, info: &ConnectionInfo) -> Result<Box<dyn VectorDatabase>> {
        info.validate()?;
        Ok(Box::new(self.database.clone()))
    }
}
