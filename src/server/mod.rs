//! # HTTP API
//!
//! JSON endpoints backing the visualizer's "load from database" panel. Each
//! request carries its own connection fields (`endpoint_url`, `token`,
//! `db_name`, `keyspace`); nothing about the connection is kept between
//! requests.
//!
//! - `POST /api/astra/collections` - vector-enabled collections
//! - `POST /api/astra/tables` - tables with vector columns
//! - `POST /api/astra/sample` - preview rows of a collection
//! - `POST /api/astra/sample_table` - preview rows of a table
//! - `POST /api/astra/metadata_keys` - candidate metadata keys of a preview
//! - `POST /api/astra/save_data` - materialize a dataset
//! - `GET /api/astra/config` - the projector manifest
//! - `GET /health`
//!
//! Anything else is served from the static directory when one is configured.
//!
//! ```bash
//! curl -X POST http://localhost:8000/api/astra/collections \
//!      -H 'Content-Type: application/json' \
//!      -d '{"endpoint_url": "https://<db>.apps.astra.datastax.com", "token": "AstraCS:..."}'
//! ```


use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dataapi::{Connector, Document, VectorDatabase};
use crate::manifest::Manifest;
use crate::pipeline::{
    DatasetLayout, MaterializeOutcome, MaterializeRequest, MetadataKey, extract_keys,
    list_collections, list_tables, materialize, sample,
};
use crate::source::{
    COLLECTION_VECTOR_FIELD, CollectionDescriptor, ConnectionInfo, SourceKind, SourceRef,
    TableDescriptor,
};
use crate::{ProjectorError, Result};

#[derive(Clone)]
pub struct AppState {
    connector: Arc<dyn Connector>,
    layout: Arc<DatasetLayout>,
}

impl AppState {
    #[inline]
    pub fn new(connector: Arc<dyn Connector>, layout: DatasetLayout) -> Self {
        Self {
            connector,
            layout: Arc::new(layout),
        }
    }

    fn connect(&self, info: &ConnectionInfo) -> Result<Box<dyn VectorDatabase>> {
        self.connector.connect(info)
    }
}

#[derive(Debug, Deserialize)]
struct SampleCollectionBody {
    collection_name: String,
}

#[derive(Debug, Deserialize)]
struct SampleTableBody {
    table_name: String,
    vector_column: String,
    #[serde(default)]
    primary_key_columns: Vec<String>,
    #[serde(default)]
    partition_key_columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataKeysBody {
    sample_data: Vec<Document>,
    #[serde(default)]
    vector_field: Option<String>,
}

#[derive(Debug, Serialize)]
struct CollectionsResponse {
    collections: Vec<CollectionDescriptor>,
}

#[derive(Debug, Serialize)]
struct TablesResponse {
    tables: Vec<TableDescriptor>,
}

#[derive(Debug, Serialize)]
struct SampleResponse {
    sample_data: Vec<Document>,
}

#[derive(Debug, Serialize)]
struct MetadataKeysResponse {
    keys: Vec<String>,
    default_selected: Vec<String>,
    details: Vec<MetadataKey>,
}

impl IntoResponse for ProjectorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Decode a JSON body, reporting shape errors as validation failures
fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|e| ProjectorError::validation(format!("Invalid request body: {}", e)))
}

/// Take the connection out of a body, nested under `connection` or inline
fn take_connection(body: &mut Value) -> Result<ConnectionInfo> {
    match body.as_object_mut().and_then(|object| object.remove("connection")) {
        Some(connection) => parse_body(connection),
        None => parse_body(body.clone()),
    }
}

/// Run a blocking pipeline call off the async executor
async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ProjectorError::Other(anyhow::anyhow!("Background task failed: {}", e)))?
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "astra-projector"
    }))
}

async fn collections_handler(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<Json<CollectionsResponse>> {
    let connection = take_connection(&mut body)?;
    let collections = run_blocking(move || {
        let db = state.connect(&connection)?;
        list_collections(db.as_ref())
    })
    .await?;

    Ok(Json(CollectionsResponse { collections }))
}

async fn tables_handler(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<Json<TablesResponse>> {
    let connection = take_connection(&mut body)?;
    let tables = run_blocking(move || {
        let db = state.connect(&connection)?;
        list_tables(db.as_ref())
    })
    .await?;

    Ok(Json(TablesResponse { tables }))
}

async fn sample_collection_handler(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<Json<SampleResponse>> {
    let connection = take_connection(&mut body)?;
    let body: SampleCollectionBody = parse_body(body)?;
    let source = SourceRef::collection(body.collection_name);
    source.validate()?;

    let sample_data = run_blocking(move || {
        let db = state.connect(&connection)?;
        sample(db.as_ref(), &source)
    })
    .await?;

    Ok(Json(SampleResponse { sample_data }))
}

async fn sample_table_handler(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<Json<SampleResponse>> {
    let connection = take_connection(&mut body)?;
    let body: SampleTableBody = parse_body(body)?;
    if body.table_name.trim().is_empty() || body.vector_column.trim().is_empty() {
        return Err(ProjectorError::validation(
            "table_name and vector_column are required",
        ));
    }

    let SampleTableBody {
        table_name,
        vector_column,
        primary_key_columns,
        partition_key_columns,
    } = body;

    let sample_data = run_blocking(move || {
        let db = state.connect(&connection)?;
        let primary_key_columns = if primary_key_columns.is_empty() {
            lookup_primary_key(db.as_ref(), &table_name)?
        } else {
            primary_key_columns
        };
        let source = SourceRef::Table {
            name: table_name,
            vector_column,
            primary_key_columns,
            partition_key_columns,
        };
        sample(db.as_ref(), &source)
    })
    .await?;

    Ok(Json(SampleResponse { sample_data }))
}

/// Primary key of a table as reported by the database
fn lookup_primary_key(db: &dyn VectorDatabase, table_name: &str) -> Result<Vec<String>> {
    db.list_tables()?
        .into_iter()
        .find(|table| table.name == table_name)
        .map(|table| {
            table
                .partition_by
                .into_iter()
                .chain(table.partition_sort)
                .collect()
        })
        .ok_or_else(|| ProjectorError::SourceNotFound {
            kind: SourceKind::Table,
            name: table_name.to_string(),
        })
}

async fn metadata_keys_handler(Json(body): Json<Value>) -> Result<Json<MetadataKeysResponse>> {
    let body: MetadataKeysBody = parse_body(body)?;
    let vector_field = body
        .vector_field
        .as_deref()
        .unwrap_or(COLLECTION_VECTOR_FIELD);
    let keys = extract_keys(&body.sample_data, vector_field)?;

    Ok(Json(MetadataKeysResponse {
        keys: keys.names().into_iter().map(str::to_string).collect(),
        default_selected: keys
            .default_selected()
            .into_iter()
            .map(str::to_string)
            .collect(),
        details: keys.keys().to_vec(),
    }))
}

async fn save_data_handler(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<Json<MaterializeOutcome>> {
    let connection = take_connection(&mut body)?;
    let request = MaterializeRequest::from_json(body)?;
    request.validate()?;

    let outcome = run_blocking(move || {
        let db = state.connect(&connection)?;
        materialize(db.as_ref(), &request, &state.layout)
    })
    .await?;

    info!(
        "Materialized '{}' with {} vectors",
        outcome.tensor_name, outcome.rows_written
    );
    Ok(Json(outcome))
}

async fn config_handler(State(state): State<AppState>) -> Result<Json<Manifest>> {
    let manifest = run_blocking(move || Manifest::load(state.layout.manifest_path())).await?;
    Ok(Json(manifest))
}

/// Build the router; `static_dir` is mounted as the fallback when given
#[inline]
pub fn create_app(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/api/astra/collections", post(collections_handler))
        .route("/api/astra/tables", post(tables_handler))
        .route("/api/astra/sample", post(sample_collection_handler))
        .route("/api/astra/sample_table", post(sample_table_handler))
        .route("/api/astra/metadata_keys", post(metadata_keys_handler))
        .route("/api/astra/save_data", post(save_data_handler))
        .route("/api/astra/config", get(config_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[inline]
pub async fn start_server(config: &Config, connector: Arc<dyn Connector>) -> anyhow::Result<()> {
    let layout = config.dataset_layout();
    let static_dir = config.server.static_dir.as_path();
    let static_dir = if static_dir.is_dir() {
        Some(static_dir)
    } else {
        warn!(
            "Static directory {} does not exist; serving the API only",
            static_dir.display()
        );
        None
    };

    info!(
        "Writing datasets to {}, manifest at {}",
        layout.data_dir().display(),
        layout.manifest_path().display()
    );
    let app = create_app(AppState::new(connector, layout), static_dir);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(
        "Astra projector server listening on {}:{}",
        config.server.host, config.server.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
