//! Arrow to PostgreSQL type mapping for binary COPY.

use arrow::array::{
    Array, ArrayRef, Float64Array, Int32Array, Int64Array, LargeStringArray, StringArray,
};
use arrow::datatypes::{DataType, SchemaRef};
use tokio_postgres::types::{ToSql, Type};

use crate::error::{LqError, Result};
use crate::utils::arrow::downcast_array;

/// A boxed value for one COPY cell
pub type Cell<'a> = Box<dyn ToSql + Sync + Send + 'a>;

/// PostgreSQL wire type for an Arrow type, if it can be copied
#[must_use]
pub fn pg_type(data_type: &DataType) -> Option<Type> {
    match data_type {
        DataType::Int32 => Some(Type::INT4),
        DataType::Int64 => Some(Type::INT8),
        DataType::Float64 => Some(Type::FLOAT8),
        DataType::Utf8 | DataType::LargeUtf8 => Some(Type::VARCHAR),
        _ => None,
    }
}

/// Build `COPY <table> (<columns>) FROM STDIN BINARY` for a batch schema
#[must_use]
pub fn copy_statement(table: &str, schema: &SchemaRef) -> String {
    let columns = schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("COPY {table} ({columns}) FROM STDIN BINARY")
}

/// A typed view of one Arrow column that yields COPY cells
pub enum PgColumn<'a> {
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    Float64(&'a Float64Array),
    Utf8(&'a StringArray),
    LargeUtf8(&'a LargeStringArray),
}

impl<'a> PgColumn<'a> {
    /// Downcast a column, failing on types without a COPY mapping
    pub fn try_new(name: &str, array: &'a ArrayRef) -> Result<Self> {
        Ok(match array.data_type() {
            DataType::Int32 => Self::Int32(downcast_array(array, name)?),
            DataType::Int64 => Self::Int64(downcast_array(array, name)?),
            DataType::Float64 => Self::Float64(downcast_array(array, name)?),
            DataType::Utf8 => Self::Utf8(downcast_array(array, name)?),
            DataType::LargeUtf8 => Self::LargeUtf8(downcast_array(array, name)?),
            other => {
                return Err(LqError::persistence(
                    name,
                    format!("no PostgreSQL mapping for column type {other:?}"),
                ));
            }
        })
    }

    /// Value of `row`, null-aware
    #[must_use]
    pub fn cell(&self, row: usize) -> Cell<'a> {
        match *self {
            Self::Int32(a) => Box::new(a.is_valid(row).then(|| a.value(row))),
            Self::Int64(a) => Box::new(a.is_valid(row).then(|| a.value(row))),
            Self::Float64(a) => Box::new(a.is_valid(row).then(|| a.value(row))),
            Self::Utf8(a) => Box::new(a.is_valid(row).then(|| a.value(row))),
            Self::LargeUtf8(a) => Box::new(a.is_valid(row).then(|| a.value(row))),
        }
    }
}
