//! Arrow data handling utilities
//!
//! Helpers for pulling typed columns out of record batches regardless of the
//! physical type the upstream writer chose.

pub mod array_utils;

pub use array_utils::{
    downcast_array, get_column, int32_column, map_strings, string_column, string_values,
};
