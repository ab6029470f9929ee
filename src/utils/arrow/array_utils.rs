//! Utilities for working with Arrow arrays.
//!
//! Key columns arrive as integers or strings depending on which extract they
//! came from, so every accessor here coerces to the expected type with
//! Arrow's cast kernel before downcasting.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int32Array, StringArray};
use arrow::compute::kernels::cast;
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use log::debug;

use crate::error::Result;

/// Get a column from a record batch, converted to `expected_type`
///
/// # Returns
///
/// * `Ok(Some(ArrayRef))` - The column array (converted if necessary)
/// * `Ok(None)` - If the batch has no column with that name
/// * `Err` - If the conversion fails
pub fn get_column(
    batch: &RecordBatch,
    column_name: &str,
    expected_type: &DataType,
) -> Result<Option<ArrayRef>> {
    let Ok(idx) = batch.schema().index_of(column_name) else {
        return Ok(None);
    };

    let column = batch.column(idx);
    if column.data_type() == expected_type {
        return Ok(Some(Arc::clone(column)));
    }

    debug!(
        "Converting column '{column_name}' from {:?} to {expected_type:?}",
        column.data_type()
    );
    Ok(Some(cast::cast(column, expected_type)?))
}

/// Downcast a column to a specific array type
///
/// # Errors
/// Returns an Arrow cast error naming the column when the downcast fails
pub fn downcast_array<'a, A: Array + 'static>(
    array: &'a ArrayRef,
    column_name: &str,
) -> Result<&'a A> {
    array.as_any().downcast_ref::<A>().ok_or_else(|| {
        ArrowError::CastError(format!(
            "column '{column_name}' is {:?}, not the expected array type",
            array.data_type()
        ))
        .into()
    })
}

/// Get a column as a `StringArray`, casting from any castable type
pub fn string_column(batch: &RecordBatch, column_name: &str) -> Result<Option<StringArray>> {
    match get_column(batch, column_name, &DataType::Utf8)? {
        Some(array) => Ok(Some(downcast_array::<StringArray>(&array, column_name)?.clone())),
        None => Ok(None),
    }
}

/// Get a column as an `Int32Array`, casting from any castable type
pub fn int32_column(batch: &RecordBatch, column_name: &str) -> Result<Option<Int32Array>> {
    match get_column(batch, column_name, &DataType::Int32)? {
        Some(array) => Ok(Some(downcast_array::<Int32Array>(&array, column_name)?.clone())),
        None => Ok(None),
    }
}

/// Collect the values of a string array, mapping nulls to `None`
#[must_use]
pub fn string_values(array: &StringArray) -> Vec<Option<&str>> {
    array.iter().collect()
}

/// Apply a transformation to every non-null value of a string array
#[must_use]
pub fn map_strings(array: &StringArray, f: impl Fn(&str) -> String) -> StringArray {
    array.iter().map(|v| v.map(&f)).collect()
}
