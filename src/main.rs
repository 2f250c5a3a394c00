use anyhow::{Context, Result};
use astra_projector::commands::{
    MaterializeOptions, SourceSelector, materialize_dataset, prepare, serve, show_collections,
    show_sample, show_tables,
};
use astra_projector::config::{Config, run_interactive_config, show_config};
use astra_projector::pipeline::SamplingStrategy;
use astra_projector::source::ConnectionInfo;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "astra-projector")]
#[command(about = "Prepare Astra DB vector data for an embedding projector")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
struct ConnectionArgs {
    /// Data API endpoint, e.g. https://<db-id>-<region>.apps.astra.datastax.com
    #[arg(long, env = "ASTRA_DB_API_ENDPOINT")]
    endpoint: String,
    /// Application token
    #[arg(long, env = "ASTRA_DB_APPLICATION_TOKEN", hide_env_values = true)]
    token: String,
    /// Keyspace; defaults to default_keyspace
    #[arg(long, env = "ASTRA_DB_KEYSPACE")]
    keyspace: Option<String>,
}

impl ConnectionArgs {
    fn into_info(self) -> ConnectionInfo {
        let info = ConnectionInfo::new(self.endpoint, self.token);
        match self.keyspace {
            Some(keyspace) => info.with_keyspace(keyspace),
            None => info,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Collection to read from
    #[arg(long)]
    collection: Option<String>,
    /// Table to read from
    #[arg(long)]
    table: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// The first rows in the database's natural order
    FirstRows,
    /// Rows spread across partition token ranges (tables only)
    TokenRange,
}

impl From<Strategy> for SamplingStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::FirstRows => Self::FirstRows,
            Strategy::TokenRange => Self::TokenRange,
        }
    }
}

fn selector(source: SourceArgs, vector_column: Option<String>) -> Result<SourceSelector> {
    match (source.collection, source.table) {
        (Some(name), None) => Ok(SourceSelector::Collection(name)),
        (None, Some(name)) => Ok(SourceSelector::Table {
            name,
            vector_column,
        }),
        _ => anyhow::bail!("Pass exactly one of --collection or --table"),
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the server and output locations
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Serve the visualizer and its Data API helper endpoints
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// List vector-enabled collections
    Collections {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// List tables with vector columns
    Tables {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Preview rows and candidate metadata keys of a source
    Sample {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        source: SourceArgs,
        /// Vector column of a table; the first one when omitted
        #[arg(long)]
        vector_column: Option<String>,
    },
    /// Write vector and metadata files and register them in the projector config
    Materialize {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        source: SourceArgs,
        /// Vector column of a table; the first one when omitted
        #[arg(long)]
        vector_column: Option<String>,
        /// Tensor name; defaults to the source name
        #[arg(long)]
        tensor_name: Option<String>,
        /// Comma-separated metadata keys; defaults to the sample's suggestions
        #[arg(long, value_delimiter = ',')]
        keys: Option<Vec<String>>,
        /// Maximum number of rows to write
        #[arg(long)]
        limit: Option<usize>,
        /// How rows are chosen
        #[arg(long, value_enum, default_value_t = Strategy::FirstRows)]
        strategy: Strategy,
    },
    /// Interactively choose a source, metadata keys and a tensor name
    Prepare {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Config { show } = cli.command {
        return if show {
            show_config()
        } else {
            run_interactive_config()
        };
    }

    let mut config = Config::load_default().context("Failed to load configuration")?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.set_port(port)?;
            }
            serve(&config)?;
        }
        Commands::Collections { connection } => {
            show_collections(&connection.into_info(), &config)?;
        }
        Commands::Tables { connection } => {
            show_tables(&connection.into_info(), &config)?;
        }
        Commands::Sample {
            connection,
            source,
            vector_column,
        } => {
            let selector = selector(source, vector_column)?;
            show_sample(&connection.into_info(), &selector, &config)?;
        }
        Commands::Materialize {
            connection,
            source,
            vector_column,
            tensor_name,
            keys,
            limit,
            strategy,
        } => {
            let selector = selector(source, vector_column)?;
            let options = MaterializeOptions {
                tensor_name,
                metadata_keys: keys,
                document_limit: limit,
                sampling_strategy: strategy.into(),
            };
            materialize_dataset(&connection.into_info(), &selector, options, &config)?;
        }
        Commands::Prepare { connection } => {
            prepare(connection.into_info(), &config)?;
        }
    }

    Ok(())
}
