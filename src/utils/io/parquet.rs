//! Parquet file operations
//!
//! This module provides utilities for finding Parquet files, reading them into
//! Arrow record batches with an optional column projection, and writing
//! record batches back out.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::compute::concat_batches;
use arrow::datatypes::Schema;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use itertools::Itertools;
use parquet::arrow::ArrowWriter;
use parquet::arrow::{ProjectionMask, arrow_reader::ParquetRecordBatchReaderBuilder};

use crate::error::{LqError, Result};
use crate::utils::logging::{log_operation_complete, log_operation_start, log_warning};

/// Default batch size for Parquet reading
pub const DEFAULT_BATCH_SIZE: usize = 16384;

/// Helper function to get batch size from environment
#[must_use]
pub fn get_batch_size() -> usize {
    std::env::var("PARQUET_BATCH_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_BATCH_SIZE)
}

/// Validates that a directory exists and is a directory
///
/// # Errors
/// Returns an error if the directory does not exist or is not a directory
pub fn validate_directory(dir: &Path) -> Result<()> {
    if !dir.exists() || !dir.is_dir() {
        return Err(LqError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory does not exist: {}", dir.display()),
        )));
    }
    Ok(())
}

/// Build a projection mask for the named columns
///
/// Columns absent from the file are skipped with a warning; callers check for
/// required columns on the resulting batch. Returns `None` when nothing
/// matched, meaning all columns are read.
#[must_use]
pub fn create_projection(
    columns: &[&str],
    file_schema: &Schema,
    parquet_schema: &parquet::schema::types::SchemaDescriptor,
) -> Option<ProjectionMask> {
    let projection = columns
        .iter()
        .filter_map(|name| match file_schema.index_of(name) {
            Ok(idx) => Some(idx),
            Err(_) => {
                log::debug!("Column {name} not found in parquet file, skipping");
                None
            }
        })
        .collect_vec();

    if projection.is_empty() {
        log_warning(
            "No matching columns found in projection, reading all columns",
            None,
        );
        None
    } else {
        Some(ProjectionMask::roots(parquet_schema, projection))
    }
}

/// Read a parquet file into a single record batch
///
/// An empty file yields an empty batch carrying the file schema.
///
/// # Arguments
/// * `path` - Path to the Parquet file
/// * `columns` - Optional column names to project
///
/// # Errors
/// Returns an error if the file cannot be opened or if the Parquet file is invalid
pub fn read_parquet_single_batch(path: &Path, columns: Option<&[&str]>) -> Result<RecordBatch> {
    let start = std::time::Instant::now();
    log_operation_start("Reading parquet file", path.display());

    let file = File::open(path).map_err(|e| {
        LqError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open file {}: {e}", path.display()),
        ))
    })?;

    let mut builder =
        ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(get_batch_size());

    if let Some(columns) = columns {
        if let Some(mask) = create_projection(columns, builder.schema(), builder.parquet_schema())
        {
            builder = builder.with_projection(mask);
        }
    }

    let reader = builder.build()?;
    let schema = reader.schema();
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    let batch = concat_batches(&schema, &batches)?;

    log_operation_complete("read", path.display(), batch.num_rows(), Some(start.elapsed()));
    Ok(batch)
}

/// Write a record batch to a new parquet file
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Find all Parquet files in a directory, sorted by file name
///
/// # Errors
/// Returns an error if directory reading fails
pub fn find_parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    log_operation_start("Searching for parquet files in", dir.display());
    validate_directory(dir)?;

    let parquet_files = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .filter_ok(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "parquet"))
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .sorted()
        .collect_vec();

    if parquet_files.is_empty() {
        log_warning("No Parquet files found in directory", Some(dir));
    } else {
        log_operation_complete("found", dir.display(), parquet_files.len(), None);
    }

    Ok(parquet_files)
}
