use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, MultiSelect, Select};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::ProjectorError;
use crate::config::Config;
use crate::dataapi::{Connector, DataApiConnector, VectorDatabase};
use crate::pipeline::materialize::parse_document_limit;
use crate::pipeline::{
    MaterializeOutcome, MaterializeRequest, SamplingStrategy, WorkflowState, extract_keys,
    list_collections, list_tables, materialize, sample,
};
use crate::server::start_server;
use crate::source::{ConnectionInfo, EstimatedCount, SourceKind, SourceRef};

/// Source named on the command line, resolved against the database before use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelector {
    Collection(String),
    Table {
        name: String,
        vector_column: Option<String>,
    },
}

/// Options of a non-interactive materialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOptions {
    pub tensor_name: Option<String>,
    /// Metadata keys; the sample's default selection when `None`
    pub metadata_keys: Option<Vec<String>>,
    pub document_limit: Option<usize>,
    pub sampling_strategy: SamplingStrategy,
}

fn connect(connection: &ConnectionInfo, config: &Config) -> Result<Box<dyn VectorDatabase>> {
    let connector = DataApiConnector::new(config.data_api.timeout());
    connector
        .connect(connection)
        .context("Failed to open a Data API connection")
}

fn spinner(message: String) -> Result<ProgressBar> {
    let bar = if console::user_attended_stderr() {
        let bar = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").context("Invalid progress template")?,
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message);
    Ok(bar)
}

fn describe_count(count: EstimatedCount) -> String {
    match count {
        EstimatedCount::Known(count) => format!("~{} documents", count),
        EstimatedCount::NotAvailable => "count not available".to_string(),
        EstimatedCount::Error => "count failed".to_string(),
    }
}

/// Start the HTTP API and static file server
#[inline]
pub fn serve(config: &Config) -> Result<()> {
    let connector = Arc::new(DataApiConnector::new(config.data_api.timeout()));
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(start_server(config, connector))
}

/// Print the vector-enabled collections of a keyspace
#[inline]
pub fn show_collections(connection: &ConnectionInfo, config: &Config) -> Result<()> {
    let db = connect(connection, config)?;
    let collections = list_collections(db.as_ref())?;

    println!(
        "Vector collections in '{}' ({} total):",
        connection.keyspace(),
        collections.len()
    );
    println!();
    for collection in &collections {
        println!("📦 {}", style(&collection.name).bold());
        println!("   Dimension: {}", collection.dimension);
        println!("   Documents: {}", describe_count(collection.count));
    }

    Ok(())
}

/// Print the tables with vector columns of a keyspace
#[inline]
pub fn show_tables(connection: &ConnectionInfo, config: &Config) -> Result<()> {
    let db = connect(connection, config)?;
    let tables = list_tables(db.as_ref())?;

    println!(
        "Vector tables in '{}' ({} total):",
        connection.keyspace(),
        tables.len()
    );
    println!();
    for table in &tables {
        println!("🗂  {}", style(&table.name).bold());
        println!(
            "   Vector columns: {}",
            table
                .vector_columns
                .iter()
                .map(|column| format!("{} ({})", column.name, column.dimension))
                .join(", ")
        );
        println!("   Primary key: {}", table.primary_key_columns.join(", "));
        println!("   Partition key: {}", table.partition_keys().join(", "));
    }

    Ok(())
}

/// Resolve a command-line selector to a source reference and its dimension
fn resolve_source(db: &dyn VectorDatabase, selector: &SourceSelector) -> Result<(SourceRef, usize)> {
    match selector {
        SourceSelector::Collection(name) => {
            let collection = list_collections(db)?
                .into_iter()
                .find(|collection| &collection.name == name)
                .ok_or_else(|| ProjectorError::SourceNotFound {
                    kind: SourceKind::Collection,
                    name: name.clone(),
                })?;
            Ok((SourceRef::collection(&collection.name), collection.dimension))
        }
        SourceSelector::Table {
            name,
            vector_column,
        } => {
            let table = list_tables(db)?
                .into_iter()
                .find(|table| &table.name == name)
                .ok_or_else(|| ProjectorError::SourceNotFound {
                    kind: SourceKind::Table,
                    name: name.clone(),
                })?;

            let column = match vector_column {
                Some(column) => table.vector_column(column).ok_or_else(|| {
                    ProjectorError::validation(format!(
                        "Table '{}' has no vector column '{}'",
                        table.name, column
                    ))
                })?,
                None => table.vector_columns.first().ok_or_else(|| {
                    ProjectorError::validation(format!(
                        "Table '{}' has no vector column",
                        table.name
                    ))
                })?,
            };
            Ok((table.source_ref(&column.name), column.dimension))
        }
    }
}

/// Print a preview of rows together with the candidate metadata keys
#[inline]
pub fn show_sample(
    connection: &ConnectionInfo,
    selector: &SourceSelector,
    config: &Config,
) -> Result<()> {
    let db = connect(connection, config)?;
    let (source, _) = resolve_source(db.as_ref(), selector)?;
    let rows = sample(db.as_ref(), &source)?;

    for (index, row) in rows.iter().enumerate() {
        let mut preview = row.clone();
        if let Some(vector) = preview.get_mut(source.vector_field()) {
            let length = vector.as_array().map_or(0, Vec::len);
            *vector = serde_json::Value::String(format!("<{} components>", length));
        }
        println!("{} {}", style(format!("#{}", index + 1)).dim(), serde_json::to_string(&preview)?);
    }

    let keys = extract_keys(&rows, source.vector_field())?;
    println!();
    println!("Metadata keys:");
    for key in keys.keys() {
        let marker = if key.default_included { "✓" } else { " " };
        println!("  [{}] {}", style(marker).green(), key.name);
    }

    Ok(())
}

fn print_outcome(outcome: &MaterializeOutcome) {
    println!("{}", style(format!("✓ {}", outcome.message)).green());
    println!(
        "  Tensor shape: [{}, {}]",
        outcome.tensor_shape[0], outcome.tensor_shape[1]
    );
    println!("  Vectors: {}", outcome.vector_file);
    println!("  Metadata: {}", outcome.metadata_file);
    println!("  Projector config: {}", outcome.config_file);
}

/// Fetch rows and write projector artifacts without prompting
#[inline]
pub fn materialize_dataset(
    connection: &ConnectionInfo,
    selector: &SourceSelector,
    options: MaterializeOptions,
    config: &Config,
) -> Result<()> {
    let db = connect(connection, config)?;
    let (source, vector_dimension) = resolve_source(db.as_ref(), selector)?;

    let metadata_keys = match options.metadata_keys {
        Some(keys) => keys,
        None => {
            let rows = sample(db.as_ref(), &source)?;
            extract_keys(&rows, source.vector_field())?
                .default_selected()
                .into_iter()
                .map(str::to_string)
                .collect()
        }
    };

    let request = MaterializeRequest {
        tensor_name: options
            .tensor_name
            .unwrap_or_else(|| source.name().to_string()),
        source,
        vector_dimension,
        metadata_keys,
        document_limit: options.document_limit,
        sampling_strategy: options.sampling_strategy,
    };
    request.validate()?;
    info!("Materializing with keys: {}", request.metadata_keys.join(", "));

    let bar = spinner(format!("Fetching rows from {}", request.source))?;
    let layout = config.dataset_layout();
    let result = materialize(db.as_ref(), &request, &layout);
    bar.finish_and_clear();

    print_outcome(&result?);
    Ok(())
}

/// Walk through source selection, sampling and key choice interactively
#[inline]
pub fn prepare(connection: ConnectionInfo, config: &Config) -> Result<()> {
    eprintln!("{}", style("🔭 Prepare a projector dataset").bold().cyan());
    eprintln!();

    let db = connect(&connection, config)?;
    let mut state = WorkflowState::new(connection);

    let kinds = &["Collections", "Tables"];
    let kind_index = Select::new()
        .with_prompt("Load from")
        .default(0)
        .items(kinds)
        .interact()?;

    if kind_index == 0 {
        let collections = list_collections(db.as_ref())?;
        let labels: Vec<String> = collections
            .iter()
            .map(|c| format!("{} (dim {}, {})", c.name, c.dimension, describe_count(c.count)))
            .collect();
        let index = Select::new()
            .with_prompt("Collection")
            .default(0)
            .items(&labels)
            .interact()?;
        state.select_collection(&collections[index]);
    } else {
        let tables = list_tables(db.as_ref())?;
        let labels: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
        let index = Select::new()
            .with_prompt("Table")
            .default(0)
            .items(&labels)
            .interact()?;
        let table = &tables[index];

        let columns: Vec<String> = table
            .vector_columns
            .iter()
            .map(|column| format!("{} (dim {})", column.name, column.dimension))
            .collect();
        let column_index = if columns.len() == 1 {
            0
        } else {
            Select::new()
                .with_prompt("Vector column")
                .default(0)
                .items(&columns)
                .interact()?
        };
        state.select_table(table, &table.vector_columns[column_index].name)?;
    }

    let bar = spinner("Sampling rows".to_string())?;
    let sampled = state.take_sample(db.as_ref());
    bar.finish_and_clear();
    let keys = sampled?.clone();
    eprintln!(
        "Sampled {} rows, found {} metadata keys.",
        state.sample_rows().len(),
        keys.len()
    );

    let defaults: Vec<bool> = keys.keys().iter().map(|key| key.default_included).collect();
    let chosen = MultiSelect::new()
        .with_prompt("Metadata keys (space to toggle)")
        .items(&keys.names())
        .defaults(&defaults)
        .interact()?;
    state.select_keys(chosen.into_iter().map(|index| keys.keys()[index].name.clone()))?;

    let default_name = state
        .source()
        .map(|source| source.name().to_string())
        .unwrap_or_default();
    let tensor_name: String = Input::new()
        .with_prompt("Tensor name")
        .default(default_name)
        .interact_text()?;

    let limit_text: String = Input::new()
        .with_prompt("Row limit (blank for all rows)")
        .allow_empty(true)
        .validate_with(|input: &String| -> Result<(), ProjectorError> {
            parse_document_limit(&serde_json::Value::String(input.clone())).map(|_| ())
        })
        .interact_text()?;
    let document_limit = parse_document_limit(&serde_json::Value::String(limit_text))?;

    let is_table = matches!(state.source(), Some(SourceRef::Table { .. }));
    let sampling_strategy = if is_table && document_limit.is_some() {
        let strategies = &["First rows", "Spread across token ranges"];
        let index = Select::new()
            .with_prompt("Sampling strategy")
            .default(0)
            .items(strategies)
            .interact()?;
        if index == 0 {
            SamplingStrategy::FirstRows
        } else {
            SamplingStrategy::TokenRange
        }
    } else {
        SamplingStrategy::FirstRows
    };

    let request = state.request(&tensor_name, document_limit, sampling_strategy)?;
    if !Confirm::new()
        .with_prompt(format!(
            "Write '{}' to {}?",
            request.normalized_tensor_name(),
            config.dataset_layout().data_dir().display()
        ))
        .default(true)
        .interact()?
    {
        eprintln!("Nothing written.");
        return Ok(());
    }

    let bar = spinner(format!("Materializing {}", request.source))?;
    let result = state.materialize(
        db.as_ref(),
        &config.dataset_layout(),
        &tensor_name,
        document_limit,
        sampling_strategy,
    );
    bar.finish_and_clear();

    print_outcome(&result?);
    Ok(())
}
