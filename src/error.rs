//! Error types for fanda
//!
//! Every error names what went wrong locally: the missing column, the empty
//! project, or the registry call that failed.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// fanda error types
#[derive(Error, Debug)]
pub enum Error {
    /// No matched run yielded a non-empty history
    #[error("No history data: {runs_matched} run(s) matched in {entity}/{project} but none logged any rows")]
    NoData {
        /// Registry entity
        entity: String,
        /// Registry project
        project: String,
        /// Number of runs the filter matched
        runs_matched: usize,
    },

    /// A transform referenced a column absent from its input
    #[error("Column not found: {column} (available: {})", available.join(", "))]
    ColumnNotFound {
        /// Requested column or group key
        column: String,
        /// Columns present in the input table
        available: Vec<String>,
    },

    /// Invalid parameter or unsupported column type
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote registry call failed
    #[error("Registry error: {0}")]
    Registry(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a `ColumnNotFound` error listing the columns of `schema`.
    #[must_use]
    pub fn column_not_found(column: impl Into<String>, schema: &arrow::datatypes::Schema) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
            available: schema.fields().iter().map(|f| f.name().clone()).collect(),
        }
    }
}
