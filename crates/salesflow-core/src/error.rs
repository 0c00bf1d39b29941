// crates/salesflow-core/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::eda::sink::TrackingError;
use crate::join::JoinError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("file I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: polars::error::PolarsError,
    },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("invalid parameter file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("row {row}: cannot parse date '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error("row {row}: cannot parse '{value}' in boolean column '{column}'")]
    InvalidBoolean {
        column: String,
        row: usize,
        value: String,
    },

    #[error("required column '{0}' is missing")]
    MissingColumn(String),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error("failed to render {label}: {message}")]
    Render { label: String, message: String },

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
