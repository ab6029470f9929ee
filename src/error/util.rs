//! Utility functions for error handling
//!
//! Helpers that attach the dimension name or file path to lower level errors.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{LqError, Result};

/// Open a dimension source file, mapping every failure to a dimension load error
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `dimension` - Dimension the file belongs to (for error context)
pub fn open_dimension_file(path: &Path, dimension: &str) -> Result<fs::File> {
    if !path.exists() {
        return Err(LqError::dimension(
            dimension,
            format!("file not found: {}", path.display()),
        ));
    }

    if !path.is_file() {
        return Err(LqError::dimension(
            dimension,
            format!("path is not a file: {}", path.display()),
        ));
    }

    fs::File::open(path).map_err(|e| {
        let reason = match e.kind() {
            io::ErrorKind::PermissionDenied => "permission denied".to_string(),
            _ => e.to_string(),
        };
        LqError::dimension(
            dimension,
            format!("failed to open {}: {reason}", path.display()),
        )
    })
}

/// Re-label any error raised while reading a dimension as a dimension load error
pub fn in_dimension<T>(result: Result<T>, dimension: &str) -> Result<T> {
    result.map_err(|e| match e {
        LqError::DimensionLoad { .. } => e,
        other => LqError::dimension(dimension, other.to_string()),
    })
}
