//! Logging utilities
//!
//! This module provides standardized logging functions for operations.

use std::fmt::Display;
use std::path::Path;

use crate::enrich::DataQualityWarning;

/// Log an operation start with consistent format
///
/// # Arguments
/// * `operation` - Description of the operation
/// * `subject` - File, table or level being operated on
pub fn log_operation_start(operation: &str, subject: impl Display) {
    log::info!("{operation} {subject}");
}

/// Log an operation completion with consistent format
///
/// # Arguments
/// * `operation` - Description of the operation
/// * `subject` - File, table or level that was operated on
/// * `items` - Number of items processed
/// * `elapsed` - Optional elapsed time
pub fn log_operation_complete(
    operation: &str,
    subject: impl Display,
    items: usize,
    elapsed: Option<std::time::Duration>,
) {
    if let Some(duration) = elapsed {
        log::info!("Successfully {operation} {items} items for {subject} in {duration:?}");
    } else {
        log::info!("Successfully {operation} {items} items for {subject}");
    }
}

/// Log an operation warning with consistent format
///
/// # Arguments
/// * `message` - Warning message
/// * `path` - Optional path related to the warning
pub fn log_warning(message: &str, path: Option<&Path>) {
    if let Some(path) = path {
        log::warn!("{}: {}", message, path.display());
    } else {
        log::warn!("{message}");
    }
}

/// Log a non-fatal data quality warning
pub fn log_data_quality(warning: &DataQualityWarning) {
    log::warn!("Data quality: {warning}");
}
