use std::sync::Arc;

use lq_etl::loader::PersistedCounts;
use lq_etl::utils::test::{MemoryFactSink, enriched, relation_from_rows};
use lq_etl::{
    FactLoader, GeoLevel, IndustryLevel, LevelAggregator, LevelResult, LqAggregator, LqError,
};

fn level_result(level: GeoLevel) -> lq_etl::Result<LevelResult> {
    let relation = relation_from_rows(&[
        enriched(2020, "110001", 1, "01"),
        enriched(2020, "110002", 2, "02"),
        enriched(2020, "120001", 3, "47"),
    ])?;
    LqAggregator::new().aggregate(&relation, level)
}

#[test]
fn test_table_names_are_schema_qualified() {
    let loader = FactLoader::new(Arc::new(MemoryFactSink::new()), "dimensional");
    assert_eq!(
        loader.table_name(GeoLevel::Municipality, IndustryLevel::Section),
        "dimensional.fact_sec_muni"
    );
    assert_eq!(
        loader.table_name(GeoLevel::Microregion, IndustryLevel::Division),
        "dimensional.fact_div_micro"
    );
    assert_eq!(
        loader.table_name(GeoLevel::Mesoregion, IndustryLevel::Section),
        "dimensional.fact_sec_meso"
    );
}

#[tokio::test]
async fn test_append_pair_writes_both_tables() -> lq_etl::Result<()> {
    let sink = Arc::new(MemoryFactSink::new());
    let loader = FactLoader::new(sink.clone(), "dimensional");
    let result = level_result(GeoLevel::Municipality)?;

    let counts = loader.append_pair(GeoLevel::Municipality, &result).await?;

    assert_eq!(counts, PersistedCounts { section: 3, division: 3 });
    assert_eq!(counts.total(), 6);
    assert_eq!(sink.rows("dimensional.fact_sec_muni"), 3);
    assert_eq!(sink.rows("dimensional.fact_div_muni"), 3);
    assert_eq!(sink.batches("dimensional.fact_sec_muni")[0], *result.section.as_ref().unwrap());
    Ok(())
}

#[tokio::test]
async fn test_missing_or_empty_halves_are_skipped() -> lq_etl::Result<()> {
    let sink = Arc::new(MemoryFactSink::new());
    let loader = FactLoader::new(sink.clone(), "dimensional");
    let full = level_result(GeoLevel::Mesoregion)?;
    let empty = full.division.as_ref().map(|b| b.slice(0, 0));

    let result = LevelResult {
        section: None,
        division: empty,
    };
    let counts = loader.append_pair(GeoLevel::Mesoregion, &result).await?;

    assert_eq!(counts, PersistedCounts::default());
    assert!(sink.tables().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rejected_table_fails_but_other_half_is_written() -> lq_etl::Result<()> {
    let sink = Arc::new(MemoryFactSink::new());
    sink.reject("dimensional.fact_sec_micro");
    let loader = FactLoader::new(sink.clone(), "dimensional");
    let result = level_result(GeoLevel::Microregion)?;

    let err = loader
        .append_pair(GeoLevel::Microregion, &result)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            LqError::Persistence { ref table, .. } if table == "dimensional.fact_sec_micro"
        ),
        "{err}"
    );
    assert_eq!(sink.rows("dimensional.fact_sec_micro"), 0);
    assert_eq!(sink.rows("dimensional.fact_div_micro"), 3);
    Ok(())
}
