//! Relational store seams
//!
//! Everything that talks to the database goes through two small traits:
//! [`FactSink`] for bulk appends and [`SqlExecutor`] for DDL. The PostgreSQL
//! implementation lives in [`postgres`]; in-memory doubles for tests live in
//! `utils::test`.

pub mod postgres;
pub mod types;

use std::future::Future;
use std::pin::Pin;

use arrow::record_batch::RecordBatch;

use crate::error::Result;

pub use postgres::PostgresStore;

/// Bulk append of Arrow data into existing tables
pub trait FactSink: Send + Sync {
    /// Append every row of `batch` to `table` (schema-qualified), returning
    /// the number of rows written
    ///
    /// Column names of the batch are used as the target column list.
    fn append<'a>(
        &'a self,
        table: &'a str,
        batch: &'a RecordBatch,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>>;
}

/// Execution of DDL and other statements that return no rows
pub trait SqlExecutor: Send + Sync {
    /// Run one or more `;`-separated statements
    fn execute<'a>(&'a self, sql: &'a str)
    -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
