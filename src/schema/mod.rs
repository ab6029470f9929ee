//! Schema manager
//!
//! Owns the lifecycle of the star schema: the destructive full rebuild at the
//! start of a run, population of the dimension tables, and the materialized
//! views built once all facts are loaded.

pub mod ddl;
pub mod views;

use std::sync::Arc;
use std::time::Instant;

use arrow::datatypes::FieldRef;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};

use crate::dimension::DimensionStore;
use crate::dimension::geography::{DIM_MESORREGIAO, DIM_MICRORREGIAO, DIM_MUNICIPIO, DIM_UF};
use crate::dimension::industry::DIM_CNAE;
use crate::error::{LqError, Result};
use crate::store::{FactSink, SqlExecutor};
use crate::utils::logging::{log_operation_complete, log_operation_start, log_warning};

/// Outcome of a view rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewReport {
    pub views: usize,
    pub indexes: usize,
    /// Index statements that failed, with the cause
    pub failed_indexes: Vec<(String, String)>,
}

/// Applies DDL and dimension data to one schema
#[derive(Clone)]
pub struct SchemaManager {
    executor: Arc<dyn SqlExecutor>,
    sink: Arc<dyn FactSink>,
    schema: String,
}

impl SchemaManager {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        sink: Arc<dyn FactSink>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            sink,
            schema: schema.into(),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Drop the schema and recreate every dimension and fact table
    ///
    /// Destroys all previously loaded data in the schema.
    pub async fn full_rebuild(&self) -> Result<()> {
        let start = Instant::now();
        log::warn!("Dropping and recreating schema {}", self.schema);
        self.executor.execute(&ddl::full_rebuild(&self.schema)).await?;
        log::info!(
            "Schema {} rebuilt with {} dimension and 6 fact tables in {:?}",
            self.schema,
            ddl::DIMENSION_TABLES.len(),
            start.elapsed()
        );
        Ok(())
    }

    /// Write the dimension store into the dimension tables in foreign key order
    ///
    /// # Returns
    /// Rows written per table
    pub async fn load_dimensions(
        &self,
        store: &DimensionStore,
    ) -> Result<Vec<(&'static str, u64)>> {
        let geography = &store.geography;
        let batches = [
            (DIM_UF, rows_to_batch(DIM_UF, geography.ufs())?),
            (DIM_MESORREGIAO, rows_to_batch(DIM_MESORREGIAO, geography.mesorregioes())?),
            (DIM_MICRORREGIAO, rows_to_batch(DIM_MICRORREGIAO, geography.microrregioes())?),
            (DIM_MUNICIPIO, rows_to_batch(DIM_MUNICIPIO, geography.municipios())?),
            (DIM_CNAE, rows_to_batch(DIM_CNAE, store.industry.rows())?),
        ];

        let mut written = Vec::with_capacity(batches.len());
        for (dimension, batch) in &batches {
            let table = format!("{}.{dimension}", self.schema);
            let start = Instant::now();
            log_operation_start("Populating", &table);
            let rows = if batch.num_rows() == 0 {
                log_warning(&format!("Dimension {dimension} is empty"), None);
                0
            } else {
                self.sink.append(&table, batch).await?
            };
            log_operation_complete(
                "wrote",
                &table,
                usize::try_from(rows).unwrap_or(usize::MAX),
                Some(start.elapsed()),
            );
            written.push((*dimension, rows));
        }
        Ok(written)
    }

    /// Recreate every materialized view and its indexes
    ///
    /// View statements are fatal; index failures are logged and reported.
    pub async fn build_views(&self) -> Result<ViewReport> {
        let start = Instant::now();
        let all = views::all_views();

        for &(level, industry) in &all {
            self.executor
                .execute(&views::drop_view(&self.schema, level, industry))
                .await?;
        }

        let mut report = ViewReport::default();
        for &(level, industry) in &all {
            self.executor
                .execute(&views::create_view(&self.schema, level, industry))
                .await?;
            report.views += 1;
        }

        for &(level, industry) in &all {
            for statement in views::create_indexes(&self.schema, level, industry) {
                match self.executor.execute(&statement).await {
                    Ok(()) => report.indexes += 1,
                    Err(e) => {
                        log_warning(&format!("Index creation failed ({e}): {statement}"), None);
                        report.failed_indexes.push((statement, e.to_string()));
                    }
                }
            }
        }

        log::info!(
            "Built {} materialized views and {} indexes ({} failed) in {:?}",
            report.views,
            report.indexes,
            report.failed_indexes.len(),
            start.elapsed()
        );
        Ok(report)
    }
}

/// Convert dimension rows into a batch whose columns match the table
fn rows_to_batch<T>(dimension: &str, rows: &[T]) -> Result<RecordBatch>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let fields = Vec::<FieldRef>::from_type::<T>(TracingOptions::default())
        .map_err(|e| LqError::dimension(dimension, format!("cannot derive schema: {e}")))?;
    serde_arrow::to_record_batch(&fields, &rows)
        .map_err(|e| LqError::dimension(dimension, format!("cannot convert rows: {e}")))
}

impl std::fmt::Debug for SchemaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaManager")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
