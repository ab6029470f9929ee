//! Fact loader
//!
//! Appends the section and division relations of one geography level to
//! their fact tables. Tables are assumed to exist; the schema manager owns
//! their lifecycle.

use std::sync::Arc;
use std::time::Instant;

use arrow::record_batch::RecordBatch;

use crate::error::{LqError, Result};
use crate::lq::{GeoLevel, IndustryLevel, LevelResult};
use crate::store::FactSink;
use crate::utils::logging::{log_operation_complete, log_warning};

/// Rows written for each half of a level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistedCounts {
    pub section: u64,
    pub division: u64,
}

impl PersistedCounts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.section + self.division
    }
}

/// Writes level results through a [`FactSink`]
#[derive(Clone)]
pub struct FactLoader {
    sink: Arc<dyn FactSink>,
    schema: String,
}

impl FactLoader {
    pub fn new(sink: Arc<dyn FactSink>, schema: impl Into<String>) -> Self {
        Self {
            sink,
            schema: schema.into(),
        }
    }

    /// Schema-qualified fact table name
    #[must_use]
    pub fn table_name(&self, level: GeoLevel, industry: IndustryLevel) -> String {
        format!("{}.{}", self.schema, level.fact_table(industry))
    }

    /// Append both halves of a level result
    ///
    /// A missing or empty half is skipped. Both halves are attempted even if
    /// the first fails; the first failure is returned.
    ///
    /// # Errors
    /// `Persistence` naming the table that could not be written.
    pub async fn append_pair(
        &self,
        level: GeoLevel,
        result: &LevelResult,
    ) -> Result<PersistedCounts> {
        let section = self
            .append_half(level, IndustryLevel::Section, result.get(IndustryLevel::Section))
            .await;
        let division = self
            .append_half(level, IndustryLevel::Division, result.get(IndustryLevel::Division))
            .await;

        match (section, division) {
            (Ok(section), Ok(division)) => Ok(PersistedCounts { section, division }),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) | (Err(e), Err(_)) => Err(e),
        }
    }

    async fn append_half(
        &self,
        level: GeoLevel,
        industry: IndustryLevel,
        batch: Option<&RecordBatch>,
    ) -> Result<u64> {
        let table = self.table_name(level, industry);
        let Some(batch) = batch.filter(|b| b.num_rows() > 0) else {
            log_warning(
                &format!("No {} rows to persist, skipping {table}", industry.column()),
                None,
            );
            return Ok(0);
        };

        let start = Instant::now();
        let written = self.sink.append(&table, batch).await.map_err(|e| match e {
            LqError::Persistence { .. } => e,
            other => LqError::persistence(table.as_str(), other),
        })?;
        log_operation_complete(
            "appended",
            &table,
            usize::try_from(written).unwrap_or(usize::MAX),
            Some(start.elapsed()),
        );
        Ok(written)
    }
}

impl std::fmt::Debug for FactLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactLoader")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
