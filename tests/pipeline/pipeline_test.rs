use std::sync::Arc;

use lq_etl::utils::test::{
    RawRow, sample_cnae_rows, sample_dimensions, sample_geography, write_cnae_dictionary,
    write_geography, write_raw_input,
};
use lq_etl::{InputFile, LqAggregator, LqError, Pipeline, SourceFormat};
use tempfile::TempDir;

use crate::utils::{doubles, find, index_rows, test_config};

fn good_rows() -> Vec<RawRow> {
    let mut rows = Vec::new();
    rows.extend(std::iter::repeat_n(RawRow::new(2020, "110001", "01000"), 3));
    rows.push(RawRow::new(2020, "110002", "02000"));
    rows.extend(std::iter::repeat_n(RawRow::new(2020, "120001", "47000"), 4));
    rows
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bad_file_is_skipped_and_run_completes() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    let good = write_raw_input(dir.path(), "ESTB2020.parquet", &good_rows(), &[])?;
    let bad = write_raw_input(dir.path(), "csv_2021.parquet", &good_rows(), &["classe"])?;

    let (executor, sink) = doubles();
    let pipeline = Pipeline::with_backends(
        test_config(),
        executor.clone(),
        sink.clone(),
        Arc::new(LqAggregator::new()),
    );
    let summary = pipeline
        .run_with(
            sample_dimensions(),
            vec![
                InputFile::new(&good, SourceFormat::Txt),
                InputFile::new(&bad, SourceFormat::Csv),
            ],
        )
        .await?;

    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.files[0].input.path, good);
    assert_eq!(summary.failed_files.len(), 1);
    assert_eq!(summary.failed_files[0].0, bad);
    assert!(matches!(summary.failed_files[0].1, LqError::JoinKey { .. }));
    assert!(!summary.is_clean());
    assert_eq!(summary.failed_levels(), 0);
    assert_eq!(summary.views.views, 6);
    assert_eq!(summary.dimension_rows.len(), 5);

    let facts = sink.batches("dimensional.fact_sec_muni");
    assert_eq!(facts.len(), 1);
    let rows = index_rows(
        &facts[0],
        lq_etl::GeoLevel::Municipality,
        lq_etl::IndustryLevel::Section,
    );
    let row = find(&rows, 2020, "110001", "1").unwrap();
    assert_eq!((row.nac, row.est), (2.667, 1.333));
    assert_eq!(sink.tables().len(), 5 + 6);

    let statements = executor.statements();
    assert!(statements[0].starts_with("DROP SCHEMA IF EXISTS dimensional CASCADE;"));
    assert!(statements.last().unwrap().starts_with("CREATE INDEX"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_file_error_aborts_when_configured() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    let bad = write_raw_input(dir.path(), "csv_2021.parquet", &good_rows(), &["ano"])?;

    let mut config = test_config();
    config.continue_on_file_error = false;
    let (executor, sink) = doubles();
    let pipeline = Pipeline::with_backends(
        config,
        executor.clone(),
        sink.clone(),
        Arc::new(LqAggregator::new()),
    );

    let err = pipeline
        .run_with(
            sample_dimensions(),
            vec![InputFile::new(&bad, SourceFormat::Csv)],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, LqError::JoinKey { ref column, .. } if column == "ano"));
    assert!(
        executor
            .statements()
            .iter()
            .all(|s| !s.starts_with("CREATE MATERIALIZED VIEW"))
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_schema_rebuild_stops_the_run() -> lq_etl::Result<()> {
    let (executor, sink) = doubles();
    executor.fail_when("DROP SCHEMA");
    let pipeline = Pipeline::with_backends(
        test_config(),
        executor,
        sink.clone(),
        Arc::new(LqAggregator::new()),
    );

    assert!(pipeline.run_with(sample_dimensions(), Vec::new()).await.is_err());
    assert!(sink.tables().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_loads_configured_sources() -> lq_etl::Result<()> {
    let dir = TempDir::new()?;
    let dims = dir.path().join("dimensions");
    let inputs = dir.path().join("inputs");
    std::fs::create_dir_all(&dims)?;
    std::fs::create_dir_all(&inputs)?;

    write_geography(&dims, &sample_geography())?;
    write_cnae_dictionary(&dims.join("cnae.csv"), &sample_cnae_rows(), ';')?;
    write_raw_input(&inputs, "ESTB2020.parquet", &good_rows(), &["ano"])?;

    let mut config = test_config();
    config.dimensions.dir = dims.clone();
    config.dimensions.cnae_dictionary = dims.join("cnae.csv");
    config.dimensions.cnae_delimiter = ';';
    config.input_dir = Some(inputs);
    config.input_format = SourceFormat::Txt;

    let (executor, sink) = doubles();
    let pipeline = Pipeline::with_backends(
        config,
        executor,
        sink.clone(),
        Arc::new(LqAggregator::new()),
    );
    let summary = pipeline.run().await?;

    assert!(summary.is_clean());
    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.files[0].report.output_rows, 8);
    assert_eq!(sink.rows("dimensional.dim_municipio"), 4);
    // one row per (year, microregion, division)
    assert_eq!(sink.rows("dimensional.fact_div_micro"), 3);
    Ok(())
}

#[tokio::test]
async fn test_run_fails_fast_on_missing_dimensions() {
    let (executor, sink) = doubles();
    let mut config = test_config();
    config.dimensions.dir = "/nonexistent/lq-etl-dimensions".into();
    let pipeline = Pipeline::with_backends(
        config,
        executor.clone(),
        sink,
        Arc::new(LqAggregator::new()),
    );

    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, LqError::DimensionLoad { .. }), "{err}");
    assert!(executor.statements().is_empty(), "nothing destructive ran");
}
