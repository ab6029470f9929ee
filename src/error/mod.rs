//! Error handling for the location quotient pipeline.

use std::path::{Path, PathBuf};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

pub mod util;

/// Errors raised by the pipeline components
#[derive(Debug, thiserror::Error)]
pub enum LqError {
    /// A dimension source is missing, unreadable or inconsistent
    #[error("Dimension load error ({dimension}): {message}")]
    DimensionLoad {
        /// Name of the dimension, e.g. `dim_municipio`
        dimension: String,
        /// What went wrong
        message: String,
    },

    /// Raw input lacks a key column the joiner needs
    #[error("Join key error in {}: missing column '{column}'", path.display())]
    JoinKey {
        /// Input file being enriched
        path: PathBuf,
        /// Name of the absent column
        column: String,
    },

    /// Failure inside one geography level's aggregation
    #[error("Computation failure at {level} level: {message}")]
    Computation {
        /// Geography level name
        level: &'static str,
        /// Cause
        message: String,
    },

    /// Failure while appending a fact table
    #[error("Persistence error on {table}: {message}")]
    Persistence {
        /// Qualified table name
        table: String,
        /// Cause
        message: String,
    },

    /// Schema or dimension writes against the database failed
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A background task could not be joined
    #[error("Task join error: {0}")]
    Task(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error opening or reading a file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error processing Arrow data
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error processing Parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),
}

impl LqError {
    /// Build a dimension load error
    pub fn dimension(dimension: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DimensionLoad {
            dimension: dimension.into(),
            message: message.into(),
        }
    }

    /// Build a join key error for a file
    pub fn join_key(path: &Path, column: impl Into<String>) -> Self {
        Self::JoinKey {
            path: path.to_path_buf(),
            column: column.into(),
        }
    }

    /// Build a computation failure for a level
    pub fn computation(level: &'static str, message: impl Into<String>) -> Self {
        Self::Computation {
            level,
            message: message.into(),
        }
    }

    /// Build a persistence error for a table
    pub fn persistence(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Persistence {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error only invalidates the current input file
    #[must_use]
    pub const fn is_file_scoped(&self) -> bool {
        matches!(self, Self::JoinKey { .. })
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, LqError>;
