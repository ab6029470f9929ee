use std::sync::Arc;

use arrow::array::{Array, Float64Array, Int32Array, StringArray};
use arrow::record_batch::RecordBatch;
use lq_etl::{GeoLevel, IndustryLevel};

/// One output row with the industry code rendered as text
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub ano: i32,
    pub geo: String,
    pub industry: String,
    pub nac: f64,
    pub est: f64,
}

/// Read back the rows of an aggregation result
#[must_use]
pub fn index_rows(batch: &RecordBatch, level: GeoLevel, industry: IndustryLevel) -> Vec<IndexRow> {
    let ano = column::<Int32Array>(batch, "ano");
    let geo = column::<StringArray>(batch, level.id_column());
    let nac = column::<Float64Array>(batch, &level.national_column());
    let est = column::<Float64Array>(batch, &level.state_column());
    let industry_column = batch.column_by_name(industry.column()).unwrap();

    (0..batch.num_rows())
        .map(|i| IndexRow {
            ano: ano.value(i),
            geo: geo.value(i).to_string(),
            industry: match industry {
                IndustryLevel::Section => industry_column
                    .as_any()
                    .downcast_ref::<Int32Array>()
                    .unwrap()
                    .value(i)
                    .to_string(),
                IndustryLevel::Division => industry_column
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .unwrap()
                    .value(i)
                    .to_string(),
            },
            nac: nac.value(i),
            est: est.value(i),
        })
        .collect()
}

/// Find the row for a geography unit and industry code
#[must_use]
pub fn find<'a>(rows: &'a [IndexRow], ano: i32, geo: &str, industry: &str) -> Option<&'a IndexRow> {
    rows.iter()
        .find(|r| r.ano == ano && r.geo == geo && r.industry == industry)
}

fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> &'a A {
    batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("missing column {name}"))
        .as_any()
        .downcast_ref::<A>()
        .unwrap_or_else(|| panic!("unexpected type for {name}"))
}

/// Config pointing at a test schema
#[must_use]
pub fn test_config() -> lq_etl::PipelineConfig {
    let mut config = lq_etl::PipelineConfig::default();
    config.database.schema = "dimensional".to_string();
    config.level_timeout_secs = 30;
    config
}

/// Shared in-memory store doubles
#[must_use]
pub fn doubles() -> (
    Arc<lq_etl::utils::test::RecordingExecutor>,
    Arc<lq_etl::utils::test::MemoryFactSink>,
) {
    (
        Arc::new(lq_etl::utils::test::RecordingExecutor::new()),
        Arc::new(lq_etl::utils::test::MemoryFactSink::new()),
    )
}
