#[cfg(test)]
mod tests;

use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{
    CollectionDefinition, ColumnDefinition, Document, FindPage, FindQuery, TableDefinition,
    VectorDatabase, VectorOptions,
};
use crate::source::{ConnectionInfo, SourceKind};
use crate::{ProjectorError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const API_PATH: [&str; 3] = ["api", "json", "v1"];
const NOT_FOUND_HINTS: [&str; 3] = ["not found", "does not exist", "doesn't exist"];

/// Blocking client for the Data API JSON command protocol.
///
/// Every command is a single POST; failures are reported to the caller as-is
/// without retrying.
#[derive(Clone)]
pub struct DataApiClient {
    keyspace_url: Url,
    token: String,
    agent: ureq::Agent,
}

impl fmt::Debug for DataApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataApiClient")
            .field("keyspace_url", &self.keyspace_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "errorCode")]
    error_code: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse<S> {
    status: S,
}

#[derive(Debug, Deserialize)]
struct CollectionsStatus {
    collections: Vec<RawCollection>,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    name: String,
    #[serde(default)]
    options: RawCollectionOptions,
}

#[derive(Debug, Default, Deserialize)]
struct RawCollectionOptions {
    vector: Option<RawVectorOptions>,
}

#[derive(Debug, Deserialize)]
struct RawVectorOptions {
    dimension: Option<usize>,
    service: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TablesStatus {
    tables: Vec<RawTable>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    name: String,
    definition: RawTableDefinition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTableDefinition {
    #[serde(default)]
    columns: serde_json::Map<String, Value>,
    #[serde(default)]
    primary_key: RawPrimaryKey,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrimaryKey {
    #[serde(default)]
    partition_by: Vec<String>,
    #[serde(default)]
    partition_sort: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    #[serde(rename = "type")]
    column_type: String,
    dimension: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CountStatus {
    count: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    data: FindData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindData {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_state: Option<String>,
}

impl DataApiClient {
    #[inline]
    pub fn new(info: &ConnectionInfo) -> Result<Self> {
        let mut keyspace_url = info.validate()?;
        keyspace_url
            .path_segments_mut()
            .map_err(|()| {
                ProjectorError::validation(format!(
                    "Endpoint URL '{}' cannot carry a path",
                    info.endpoint_url
                ))
            })?
            .pop_if_empty()
            .extend(API_PATH)
            .push(info.keyspace());

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        debug!(
            "Created Data API client for {} (database '{}')",
            keyspace_url, info.db_name
        );

        Ok(Self {
            keyspace_url,
            token: info.token.clone(),
            agent,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn keyspace_url(&self) -> &Url {
        &self.keyspace_url
    }

    fn source_url(&self, name: &str) -> Result<Url> {
        let mut url = self.keyspace_url.clone();
        url.path_segments_mut()
            .map_err(|()| ProjectorError::Other(anyhow::anyhow!("Keyspace URL cannot be a base")))?
            .push(name);
        Ok(url)
    }

    /// Send one command and return the decoded JSON body.
    ///
    /// `target` names the collection or table the command addresses so that
    /// not-found errors can be reported against it.
    fn run_command(
        &self,
        url: &Url,
        command: &Value,
        target: Option<(SourceKind, &str)>,
    ) -> Result<Value> {
        let body = serde_json::to_string(command).context("Failed to serialize Data API command")?;
        debug!("POST {} ({} bytes)", url, body.len());

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Token", self.token.as_str())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(transport_error)?;

        let response: Value = serde_json::from_str(&response_text).map_err(|e| {
            ProjectorError::Upstream(format!("Data API returned invalid JSON: {}", e))
        })?;

        if let Some(errors) = response.get("errors").and_then(Value::as_array) {
            if let Some(first) = errors.first() {
                let error: ApiError = serde_json::from_value(first.clone()).unwrap_or_else(|_| ApiError {
                    message: first.to_string(),
                    error_code: String::new(),
                });
                if errors.len() > 1 {
                    debug!("Data API reported {} errors; using the first", errors.len());
                }
                return Err(api_error(&error, target));
            }
        }

        Ok(response)
    }

    fn parse<T: DeserializeOwned>(response: Value, command: &str) -> Result<T> {
        serde_json::from_value(response).map_err(|e| {
            ProjectorError::Upstream(format!("Unexpected {} response shape: {}", command, e))
        })
    }
}

impl VectorDatabase for DataApiClient {
    fn list_collections(&self) -> Result<Vec<CollectionDefinition>> {
        let command = json!({"findCollections": {"options": {"explain": true}}});
        let response = self.run_command(&self.keyspace_url, &command, None)?;
        let parsed: StatusResponse<CollectionsStatus> = Self::parse(response, "findCollections")?;

        debug!("findCollections returned {}", parsed.status.collections.len());

        Ok(parsed
            .status
            .collections
            .into_iter()
            .map(|raw| CollectionDefinition {
                name: raw.name,
                vector: raw.options.vector.map(|vector| VectorOptions {
                    dimension: vector.dimension,
                    vectorize: vector.service.is_some(),
                }),
            })
            .collect())
    }

    fn list_tables(&self) -> Result<Vec<TableDefinition>> {
        let command = json!({"listTables": {"options": {"explain": true}}});
        let response = self.run_command(&self.keyspace_url, &command, None)?;
        let parsed: StatusResponse<TablesStatus> = Self::parse(response, "listTables")?;

        debug!("listTables returned {}", parsed.status.tables.len());

        Ok(parsed
            .status
            .tables
            .into_iter()
            .map(|raw| {
                let columns = raw
                    .definition
                    .columns
                    .into_iter()
                    .filter_map(|(name, value)| match serde_json::from_value::<RawColumn>(value) {
                        Ok(column) => Some(ColumnDefinition {
                            name,
                            column_type: column.column_type,
                            dimension: column.dimension,
                        }),
                        Err(e) => {
                            warn!(
                                "Ignoring column '{}' of table '{}' with unreadable definition: {}",
                                name, raw.name, e
                            );
                            None
                        }
                    })
                    .collect();

                TableDefinition {
                    name: raw.name,
                    columns,
                    partition_by: raw.definition.primary_key.partition_by,
                    partition_sort: raw
                        .definition
                        .primary_key
                        .partition_sort
                        .into_iter()
                        .map(|(column, _)| column)
                        .collect(),
                }
            })
            .collect())
    }

    fn estimated_count(&self, collection: &str) -> Result<Option<u64>> {
        let url = self.source_url(collection)?;
        let command = json!({"estimatedDocumentCount": {}});
        let response =
            self.run_command(&url, &command, Some((SourceKind::Collection, collection)))?;
        let parsed: StatusResponse<CountStatus> = Self::parse(response, "estimatedDocumentCount")?;

        Ok(parsed.status.count.as_ref().and_then(Value::as_u64))
    }

    fn find(&self, kind: SourceKind, name: &str, query: &FindQuery) -> Result<FindPage> {
        let url = self.source_url(name)?;
        let response = self.run_command(&url, &find_command(query), Some((kind, name)))?;
        let parsed: FindResponse = Self::parse(response, "find")?;

        Ok(FindPage {
            documents: parsed.data.documents,
            next_page_state: parsed.data.next_page_state,
        })
    }
}

/// Render a query as a `find` command body
fn find_command(query: &FindQuery) -> Value {
    let mut find = serde_json::Map::new();
    find.insert("filter".to_string(), Value::Object(query.filter.clone()));

    if let Some(projection) = &query.projection {
        find.insert("projection".to_string(), Value::Object(projection.clone()));
    }

    let mut options = serde_json::Map::new();
    if let Some(limit) = query.limit {
        options.insert("limit".to_string(), json!(limit));
    }
    if let Some(page_state) = &query.page_state {
        options.insert("pageState".to_string(), json!(page_state));
    }
    if !options.is_empty() {
        find.insert("options".to_string(), Value::Object(options));
    }

    json!({ "find": find })
}

fn transport_error(error: ureq::Error) -> ProjectorError {
    match error {
        ureq::Error::StatusCode(status @ (401 | 403)) => {
            ProjectorError::Auth(format!("Data API rejected the token (HTTP {})", status))
        }
        ureq::Error::StatusCode(404) => ProjectorError::Connection(
            "Data API endpoint not found (HTTP 404); check the endpoint URL".to_string(),
        ),
        ureq::Error::StatusCode(status) => {
            ProjectorError::Upstream(format!("Data API returned HTTP {}", status))
        }
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => ProjectorError::Connection(error.to_string()),
        other => ProjectorError::Upstream(other.to_string()),
    }
}

fn api_error(error: &ApiError, target: Option<(SourceKind, &str)>) -> ProjectorError {
    let code = error.error_code.to_ascii_uppercase();
    let message = error.message.to_lowercase();

    if code.contains("UNAUTHENTICATED") || code.contains("UNAUTHORIZED") {
        return ProjectorError::Auth(error.message.clone());
    }

    if let Some((kind, name)) = target {
        let not_found = code.contains("NOT_EXIST")
            || code.contains("NOT_FOUND")
            || NOT_FOUND_HINTS.iter().any(|hint| message.contains(hint));
        if not_found {
            return ProjectorError::SourceNotFound {
                kind,
                name: name.to_string(),
            };
        }
    }

    if error.error_code.is_empty() {
        ProjectorError::Upstream(error.message.clone())
    } else {
        ProjectorError::Upstream(format!("{} ({})", error.message, error.error_code))
    }
}
