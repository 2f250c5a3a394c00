use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProjectorError>;

#[derive(Error, Debug)]
pub enum ProjectorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to connect to the Data API: {0}")]
    Connection(String),

    #[error("Authentication failed. Check your token and Data API endpoint: {0}")]
    Auth(String),

    #[error("{kind} '{name}' not found")]
    SourceNotFound { kind: source::SourceKind, name: String },

    #[error("Data API error: {0}")]
    Upstream(String),

    #[error("No vector-enabled {} found in this keyspace", .0.plural())]
    NoSources(source::SourceKind),

    #[error("No rows could be sampled from '{0}'; it appears to be empty")]
    EmptySample(String),

    #[error("No documents found in '{0}'. Check the source or the sampling strategy")]
    EmptySource(String),

    #[error("No metadata keys found in the sampled data")]
    NoMetadataKeys,

    #[error("Row {row} is missing the vector field '{field}'")]
    MissingVector { row: usize, field: String },

    #[error("Row {row} has a non-numeric value in vector field '{field}'")]
    InvalidVector { row: usize, field: String },

    #[error("Row {row} vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Row {row} is missing primary key column '{column}'")]
    MissingPrimaryKey { row: usize, column: String },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ProjectorError {
    /// HTTP status reported to API callers for this error
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Connection(_) | Self::Auth(_) => StatusCode::BAD_REQUEST,
            Self::SourceNotFound { .. }
            | Self::NoSources(_)
            | Self::EmptySample(_)
            | Self::EmptySource(_)
            | Self::NoMetadataKeys => StatusCode::NOT_FOUND,
            Self::MissingVector { .. }
            | Self::InvalidVector { .. }
            | Self::DimensionMismatch { .. }
            | Self::MissingPrimaryKey { .. } => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Manifest(_) | Self::Config(_) | Self::Io(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub mod commands;
pub mod config;
pub mod dataapi;
pub mod manifest;
pub mod pipeline;
pub mod server;
pub mod source;

#[cfg(test)]
mod tests;
