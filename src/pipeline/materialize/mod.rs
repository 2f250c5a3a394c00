//! Turns a source selection into projector artifacts.
//!
//! A materialization fetches rows with the requested sampling strategy,
//! validates every row, writes a little-endian `f32` vector file and a
//! tab-separated metadata file, then registers both in the manifest. Nothing
//! is written unless every fetched row is usable.


use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dataapi::{Document, FindQuery, VectorDatabase};
use crate::manifest::{Manifest, StagedFile, TensorEntry, commit_all};
use crate::source::SourceRef;
use crate::{ProjectorError, Result};

/// Slices of the token ring queried by the token-range strategy
pub const TOKEN_RANGES: usize = 10;
/// Rows fetched per kept row within a token slice
pub const TOKEN_RANGE_OVERSAMPLE: usize = 5;
/// Header of the synthesized column for composite primary keys
pub const COMPOSITE_KEY_COLUMN: &str = "PRIMARY_KEY";

const VECTOR_FILE_SUFFIX: &str = ".bytes";
const METADATA_FILE_SUFFIX: &str = "_metadata.tsv";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// The first rows the database returns, in its natural order
    #[default]
    #[serde(alias = "first_n")]
    FirstRows,
    /// Rows spread across the partition token ring
    #[serde(alias = "token_range_distributed")]
    TokenRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeRequest {
    pub source: SourceRef,
    pub vector_dimension: usize,
    pub tensor_name: String,
    #[serde(default)]
    pub metadata_keys: Vec<String>,
    #[serde(default)]
    pub document_limit: Option<usize>,
    #[serde(default)]
    pub sampling_strategy: SamplingStrategy,
}

impl MaterializeRequest {
    /// Build a request from loosely typed JSON.
    ///
    /// `document_limit` may be a number, a numeric string, blank or null.
    /// The source is either a tagged `source` object or the flat
    /// `collection_name` / `table_name` fields. Anything malformed is reported
    /// as a validation error.
    #[inline]
    pub fn from_json(mut value: Value) -> Result<Self> {
        if let Some(object) = value.as_object_mut() {
            if let Some(raw) = object.get("document_limit") {
                let limit = parse_document_limit(raw)?;
                object.insert("document_limit".to_string(), json!(limit));
            }
            if !object.contains_key("source") {
                let source = flat_source(object)?;
                object.insert("source".to_string(), source);
            }
        }

        serde_json::from_value(value)
            .map_err(|e| ProjectorError::validation(format!("Invalid request: {}", e)))
    }

    /// Tensor name with surrounding whitespace trimmed and inner whitespace as `_`
    #[inline]
    pub fn normalized_tensor_name(&self) -> String {
        normalize_tensor_name(&self.tensor_name)
    }

    /// Reject the request before anything touches the database
    #[inline]
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;

        if self.vector_dimension == 0 {
            return Err(ProjectorError::validation(
                "vector_dimension must be a positive integer",
            ));
        }
        if self.normalized_tensor_name().is_empty() {
            return Err(ProjectorError::validation("A tensor name is required"));
        }
        if self.document_limit == Some(0) {
            return Err(ProjectorError::validation(
                "document_limit must be a positive integer",
            ));
        }

        if self.sampling_strategy == SamplingStrategy::TokenRange {
            if !matches!(self.source, SourceRef::Table { .. }) {
                return Err(ProjectorError::validation(
                    "The token_range strategy is only available for tables",
                ));
            }
            if self.document_limit.is_none() {
                return Err(ProjectorError::validation(
                    "The token_range strategy requires a document_limit",
                ));
            }
            if self.source.partition_keys().is_empty() {
                return Err(ProjectorError::validation(
                    "The token_range strategy requires partition key columns",
                ));
            }
        }

        Ok(())
    }
}

fn text_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn list_field(object: &Map<String, Value>, key: &str) -> Value {
    match object.get(key) {
        None | Some(Value::Null) => json!([]),
        Some(value) => value.clone(),
    }
}

/// Tagged source built from `collection_name` or `table_name` and its columns
fn flat_source(object: &Map<String, Value>) -> Result<Value> {
    match (
        text_field(object, "collection_name"),
        text_field(object, "table_name"),
    ) {
        (Some(name), None) => Ok(json!({"kind": "collection", "name": name})),
        (None, Some(name)) => Ok(json!({
            "kind": "table",
            "name": name,
            "vector_column": text_field(object, "vector_column").unwrap_or_default(),
            "primary_key_columns": list_field(object, "primary_key_columns"),
            "partition_key_columns": list_field(object, "partition_key_columns"),
        })),
        (Some(_), Some(_)) => Err(ProjectorError::validation(
            "Give either collection_name or table_name, not both",
        )),
        (None, None) => Err(ProjectorError::validation(
            "A source, collection_name or table_name is required",
        )),
    }
}

/// Interpret a loosely typed row limit; blank or null means "no limit"
#[inline]
pub fn parse_document_limit(raw: &Value) -> Result<Option<usize>> {
    let invalid =
        || ProjectorError::validation(format!("document_limit must be a positive integer, got {}", raw));

    let limit = match raw {
        Value::Null => return Ok(None),
        Value::Number(number) => number.as_u64().ok_or_else(invalid)?,
        Value::String(text) if text.trim().is_empty() => return Ok(None),
        Value::String(text) => text.trim().parse::<u64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    if limit == 0 {
        return Err(invalid());
    }
    usize::try_from(limit).map(Some).map_err(|_| invalid())
}

#[inline]
pub fn normalize_tensor_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// File-system safe stem: anything outside `[A-Za-z0-9_-]` becomes `_`
#[inline]
pub fn file_stem(tensor_name: &str) -> String {
    tensor_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Where artifacts land relative to the root the visualizer serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    root_dir: PathBuf,
    data_dir: PathBuf,
    manifest_path: PathBuf,
}

impl DatasetLayout {
    #[inline]
    pub fn new(root_dir: &Path, data_dir: &Path, manifest_file: &str) -> Self {
        let data_dir = root_dir.join(data_dir);
        let manifest_path = data_dir.join(manifest_file);
        Self {
            root_dir: root_dir.to_path_buf(),
            data_dir,
            manifest_path,
        }
    }

    #[inline]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    #[inline]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[inline]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    #[inline]
    pub fn vector_path(&self, stem: &str) -> PathBuf {
        self.data_dir.join(format!("{}{}", stem, VECTOR_FILE_SUFFIX))
    }

    #[inline]
    pub fn metadata_path(&self, stem: &str) -> PathBuf {
        self.data_dir.join(format!("{}{}", stem, METADATA_FILE_SUFFIX))
    }

    /// `path` relative to the root, `/`-separated as the renderer expects
    #[inline]
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root_dir)
            .unwrap_or(path)
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .join("/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializeOutcome {
    pub message: String,
    pub tensor_name: String,
    #[serde(rename = "vectors_saved")]
    pub rows_written: usize,
    pub limit_applied: Option<usize>,
    pub sampling_strategy: SamplingStrategy,
    pub tensor_shape: [usize; 2],
    pub vector_file: String,
    pub metadata_file: String,
    pub config_file: String,
    pub entry: TensorEntry,
}

/// Identifying column(s) emitted first in the metadata file
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyColumn {
    Single(String),
    Composite(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MetadataColumns {
    key: KeyColumn,
    extra: Vec<String>,
}

impl MetadataColumns {
    fn for_source(source: &SourceRef, selected: &[String]) -> Self {
        let key_columns = source.key_columns();
        let key = match key_columns.as_slice() {
            [single] => KeyColumn::Single((*single).to_string()),
            _ => KeyColumn::Composite(key_columns.iter().map(|c| (*c).to_string()).collect()),
        };

        let extra = selected
            .iter()
            .filter(|name| !key_columns.contains(&name.as_str()))
            .filter(|name| name.as_str() != source.vector_field())
            .unique()
            .cloned()
            .collect();

        Self { key, extra }
    }

    fn header(&self) -> Vec<String> {
        let key = match &self.key {
            KeyColumn::Single(column) => column.clone(),
            KeyColumn::Composite(_) => COMPOSITE_KEY_COLUMN.to_string(),
        };
        std::iter::once(key).chain(self.extra.iter().cloned()).collect()
    }

    fn row(&self, document: &Document) -> Vec<String> {
        let key = match &self.key {
            KeyColumn::Single(column) => cell(document.get(column)),
            KeyColumn::Composite(columns) => columns
                .iter()
                .map(|column| cell(document.get(column)).replace('_', "-"))
                .join("_"),
        };
        std::iter::once(key)
            .chain(self.extra.iter().map(|name| cell(document.get(name))))
            .collect()
    }
}

/// Render one metadata cell: strings raw, null or missing empty, other JSON compact
fn cell(value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };
    text.replace(['\t', '\r', '\n'], " ")
}

/// Row-major little-endian `f32` bytes
#[inline]
pub fn encode_vectors(vectors: &[Vec<f32>]) -> Vec<u8> {
    vectors
        .iter()
        .flatten()
        .flat_map(|component| component.to_le_bytes())
        .collect()
}

/// Tab-separated metadata; the header is omitted for a single column
#[inline]
pub fn render_metadata(header: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    if header.len() > 1 {
        out.push_str(&header.join("\t"));
        out.push('\n');
    }
    for row in rows {
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

/// Fetch, validate and write one dataset, then register it in the manifest
#[inline]
pub fn materialize<D>(
    db: &D,
    request: &MaterializeRequest,
    layout: &DatasetLayout,
) -> Result<MaterializeOutcome>
where
    D: VectorDatabase + ?Sized,
{
    request.validate()?;

    let tensor_name = request.normalized_tensor_name();
    info!(
        "Materializing '{}' from {} ({:?}, limit {:?})",
        tensor_name, request.source, request.sampling_strategy, request.document_limit
    );

    let documents = fetch_rows(db, request)?;
    if documents.is_empty() {
        return Err(ProjectorError::EmptySource(
            request.source.name().to_string(),
        ));
    }

    let vectors = collect_vectors(&documents, request)?;
    let columns = MetadataColumns::for_source(&request.source, &request.metadata_keys);
    check_primary_keys(&documents, &request.source)?;

    let header = columns.header();
    let metadata_rows: Vec<Vec<String>> = documents.iter().map(|doc| columns.row(doc)).collect();

    let stem = file_stem(&tensor_name);
    let vector_path = layout.vector_path(&stem);
    let metadata_path = layout.metadata_path(&stem);

    let rows_written = vectors.len();
    let entry = TensorEntry {
        tensor_name: tensor_name.clone(),
        tensor_shape: [rows_written, request.vector_dimension],
        tensor_path: layout.relative(&vector_path),
        metadata_path: layout.relative(&metadata_path),
    };

    let mut manifest = Manifest::load(layout.manifest_path())?;
    let sharing = manifest.sharing_artifacts(&entry);
    if !sharing.is_empty() {
        warn!(
            "Tensor '{}' writes to {} and {}, which are also listed for: {}",
            tensor_name,
            entry.tensor_path,
            entry.metadata_path,
            sharing.join(", ")
        );
    }

    fs::create_dir_all(layout.data_dir())?;
    let vector_file = StagedFile::write(&vector_path, &encode_vectors(&vectors))?;
    let metadata_file =
        match StagedFile::write(&metadata_path, render_metadata(&header, &metadata_rows).as_bytes()) {
            Ok(staged) => staged,
            Err(e) => {
                warn!("Failed to write metadata for '{}'", tensor_name);
                vector_file.discard();
                return Err(e);
            }
        };
    commit_all(vec![vector_file, metadata_file])?;

    manifest.upsert(entry.clone())?;
    manifest.save(layout.manifest_path())?;

    info!(
        "Saved {} vectors for '{}' to {}",
        rows_written,
        tensor_name,
        layout.data_dir().display()
    );

    Ok(MaterializeOutcome {
        message: format!(
            "Successfully saved {} vectors and metadata for tensor '{}'",
            rows_written, tensor_name
        ),
        tensor_name,
        rows_written,
        limit_applied: request.document_limit,
        sampling_strategy: request.sampling_strategy,
        tensor_shape: entry.tensor_shape,
        vector_file: entry.tensor_path.clone(),
        metadata_file: entry.metadata_path.clone(),
        config_file: layout.relative(layout.manifest_path()),
        entry,
    })
}

/// Fields requested from the database for a materialization
fn projection_fields(request: &MaterializeRequest) -> Vec<&str> {
    let source = &request.source;
    let mut fields = vec![source.vector_field()];
    fields.extend(source.key_columns());
    fields.extend(request.metadata_keys.iter().map(String::as_str));
    if request.sampling_strategy == SamplingStrategy::TokenRange {
        fields.extend(source.partition_keys().iter().map(String::as_str));
    }
    fields.into_iter().unique().collect()
}

fn fetch_rows<D>(db: &D, request: &MaterializeRequest) -> Result<Vec<Document>>
where
    D: VectorDatabase + ?Sized,
{
    let base = FindQuery::default().with_projection(projection_fields(request));

    match (request.sampling_strategy, request.document_limit) {
        (SamplingStrategy::TokenRange, Some(limit)) => {
            fetch_token_ranges(db, &request.source, base, limit)
        }
        (SamplingStrategy::TokenRange, None) => Err(ProjectorError::validation(
            "The token_range strategy requires a document_limit",
        )),
        (SamplingStrategy::FirstRows, limit) => {
            fetch_all_pages(db, &request.source, base.with_limit(limit), limit)
        }
    }
}

/// Follow `nextPageState` until `limit` rows are collected or pages run out
fn fetch_all_pages<D>(
    db: &D,
    source: &SourceRef,
    query: FindQuery,
    limit: Option<usize>,
) -> Result<Vec<Document>>
where
    D: VectorDatabase + ?Sized,
{
    let mut rows = Vec::new();
    let mut page_state = None;

    loop {
        let page_query = query.clone().with_page_state(page_state.take());
        let page = db.find(source.kind(), source.name(), &page_query)?;
        debug!("Fetched page of {} rows from {}", page.documents.len(), source);
        rows.extend(page.documents);

        if limit.is_some_and(|limit| rows.len() >= limit) {
            break;
        }
        match page.next_page_state {
            Some(next) => page_state = Some(next),
            None => break,
        }
    }

    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    Ok(rows)
}

/// Half-open `[start, end)` token slices covering the whole signed 64-bit ring
#[inline]
pub fn token_ranges() -> Vec<(i128, i128)> {
    let min_token = i128::from(i64::MIN);
    let max_token = i128::from(i64::MAX);
    let slices = TOKEN_RANGES as i128;
    let step = (max_token - min_token) / slices;

    (0..slices)
        .map(|i| {
            let start = min_token + i * step;
            let end = if i == slices - 1 {
                max_token + 1
            } else {
                start + step
            };
            (start, end)
        })
        .collect()
}

/// Rows requested from each token slice before thinning
#[inline]
pub const fn per_range_limit(limit: usize) -> usize {
    let per_slice = limit.div_ceil(TOKEN_RANGES);
    let per_slice = if per_slice == 0 { 1 } else { per_slice };
    per_slice * TOKEN_RANGE_OVERSAMPLE
}

fn token_bound(bound: i128) -> Value {
    i64::try_from(bound)
        .map(Value::from)
        .or_else(|_| u64::try_from(bound).map(Value::from))
        .unwrap_or(Value::Null)
}

fn fetch_token_ranges<D>(
    db: &D,
    source: &SourceRef,
    base: FindQuery,
    limit: usize,
) -> Result<Vec<Document>>
where
    D: VectorDatabase + ?Sized,
{
    let filter_key = format!("token({})", source.partition_keys().join(", "));
    let range_limit = per_range_limit(limit);
    let mut rows = Vec::new();

    for (index, (start, end)) in token_ranges().into_iter().enumerate() {
        let mut filter = Document::new();
        filter.insert(
            filter_key.clone(),
            json!({"$gte": token_bound(start), "$lt": token_bound(end)}),
        );

        let query = base
            .clone()
            .with_filter(filter)
            .with_limit(Some(range_limit));
        let fetched = fetch_all_pages(db, source, query, Some(range_limit))?;
        let before = rows.len();
        rows.extend(fetched.into_iter().step_by(TOKEN_RANGE_OVERSAMPLE));
        debug!(
            "Token range {}/{} [{}, {}): kept {} rows",
            index + 1,
            TOKEN_RANGES,
            start,
            end,
            rows.len() - before
        );
    }

    rows.truncate(limit);
    Ok(rows)
}

/// Extract every row's vector, failing on the first unusable one
fn collect_vectors(documents: &[Document], request: &MaterializeRequest) -> Result<Vec<Vec<f32>>> {
    let field = request.source.vector_field();

    documents
        .iter()
        .enumerate()
        .map(|(index, document)| {
            let row = index + 1;
            let values = document
                .get(field)
                .filter(|value| !value.is_null())
                .ok_or_else(|| ProjectorError::MissingVector {
                    row,
                    field: field.to_string(),
                })?
                .as_array()
                .ok_or_else(|| ProjectorError::InvalidVector {
                    row,
                    field: field.to_string(),
                })?;

            if values.len() != request.vector_dimension {
                return Err(ProjectorError::DimensionMismatch {
                    row,
                    expected: request.vector_dimension,
                    actual: values.len(),
                });
            }

            values
                .iter()
                .map(|value| {
                    value.as_f64().map(|component| component as f32).ok_or_else(|| {
                        ProjectorError::InvalidVector {
                            row,
                            field: field.to_string(),
                        }
                    })
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect()
}

fn check_primary_keys(documents: &[Document], source: &SourceRef) -> Result<()> {
    for (index, document) in documents.iter().enumerate() {
        for column in source.key_columns() {
            if document.get(column).is_none_or(Value::is_null) {
                return Err(ProjectorError::MissingPrimaryKey {
                    row: index + 1,
                    column: column.to_string(),
                });
            }
        }
    }
    Ok(())
}
