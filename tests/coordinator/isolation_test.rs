use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use lq_etl::utils::test::{MemoryFactSink, enriched, relation_from_rows};
use lq_etl::{
    EnrichedRelation, FactLoader, FactSink, GeoLevel, LevelAggregator, LevelOutcome, LevelResult,
    LqAggregator, LqError, ParallelCoordinator, RecordBatch,
};

/// How the wrapped aggregator misbehaves on its target level
#[derive(Debug, Clone, Copy)]
enum Fault {
    Error,
    Panic,
    Stall(Duration),
}

/// Delegates to [`LqAggregator`] except on one level
struct FaultyAggregator {
    target: GeoLevel,
    fault: Fault,
}

impl LevelAggregator for FaultyAggregator {
    fn aggregate(
        &self,
        relation: &EnrichedRelation,
        level: GeoLevel,
    ) -> lq_etl::Result<LevelResult> {
        if level == self.target {
            match self.fault {
                Fault::Error => {
                    return Err(LqError::computation(level.name(), "injected failure"));
                }
                Fault::Panic => panic!("injected panic at {level}"),
                Fault::Stall(duration) => std::thread::sleep(duration),
            }
        }
        LqAggregator::new().aggregate(relation, level)
    }
}

fn relation() -> EnrichedRelation {
    let mut rows = Vec::new();
    rows.extend(std::iter::repeat_n(enriched(2020, "110001", 1, "01"), 3));
    rows.push(enriched(2020, "110002", 2, "02"));
    rows.extend(std::iter::repeat_n(enriched(2020, "120001", 3, "47"), 4));
    rows.push(enriched(2021, "120002", 1, "01"));
    relation_from_rows(&rows).unwrap()
}

async fn run_with(
    aggregator: Arc<dyn LevelAggregator>,
    timeout: Option<Duration>,
) -> (Vec<LevelOutcome>, Arc<MemoryFactSink>) {
    let sink = Arc::new(MemoryFactSink::new());
    let coordinator = ParallelCoordinator::new(
        aggregator,
        FactLoader::new(sink.clone(), "dimensional"),
        timeout,
    );
    let outcomes = coordinator.run(&relation()).await;
    (outcomes, sink)
}

/// Every table except the failed level's must match a healthy run
async fn assert_isolated(fault: Fault, timeout: Option<Duration>) -> LqError {
    let target = GeoLevel::Microregion;
    let (baseline, healthy) = run_with(Arc::new(LqAggregator::new()), None).await;
    assert!(baseline.iter().all(LevelOutcome::is_persisted));

    let (outcomes, sink) = run_with(Arc::new(FaultyAggregator { target, fault }), timeout).await;

    let levels: Vec<GeoLevel> = outcomes.iter().map(LevelOutcome::level).collect();
    assert_eq!(levels, GeoLevel::ALL.to_vec());

    for table in healthy.tables() {
        if table.ends_with("_micro") {
            assert_eq!(sink.rows(&table), 0, "{table} written by the failed level");
        } else {
            assert_eq!(sink.batches(&table), healthy.batches(&table), "{table}");
        }
    }

    let mut failed = outcomes
        .into_iter()
        .filter(|o| !o.is_persisted())
        .collect::<Vec<_>>();
    assert_eq!(failed.len(), 1);
    match failed.pop() {
        Some(LevelOutcome::Failed { level, cause }) => {
            assert_eq!(level, target);
            cause
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_levels_persist_when_healthy() {
    let (outcomes, sink) =
        run_with(Arc::new(LqAggregator::new()), Some(Duration::from_secs(30))).await;

    assert!(outcomes.iter().all(LevelOutcome::is_persisted));
    assert_eq!(sink.tables().len(), 6);
    match &outcomes[0] {
        LevelOutcome::Persisted { counts, .. } => {
            // (2020, 110001, 1), (2020, 110002, 2), (2020, 120001, 3), (2021, 120002, 1)
            assert_eq!(counts.section, 4);
            assert_eq!(counts.division, 4);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_level_does_not_affect_others() {
    let cause = assert_isolated(Fault::Error, None).await;
    assert!(cause.to_string().contains("injected failure"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_level_does_not_affect_others() {
    let cause = assert_isolated(Fault::Panic, None).await;
    assert!(matches!(cause, LqError::Computation { level: "microregion", .. }));
    assert!(cause.to_string().contains("injected panic"), "{cause}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_level_times_out() {
    let cause = assert_isolated(
        Fault::Stall(Duration::from_millis(500)),
        Some(Duration::from_millis(50)),
    )
    .await;
    assert!(cause.to_string().contains("timed out"), "{cause}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_persistence_failure_is_scoped_to_its_level() {
    let sink = Arc::new(MemoryFactSink::new());
    sink.reject("dimensional.fact_div_meso");
    let coordinator = ParallelCoordinator::new(
        Arc::new(LqAggregator::new()),
        FactLoader::new(sink.clone(), "dimensional"),
        None,
    );

    let outcomes = coordinator.run(&relation()).await;

    assert!(outcomes[0].is_persisted());
    assert!(outcomes[1].is_persisted());
    assert!(matches!(
        &outcomes[2],
        LevelOutcome::Failed { cause: LqError::Persistence { .. }, .. }
    ));
    assert_eq!(sink.rows("dimensional.fact_div_muni"), 4);
}

/// Sink that waits before every append
struct SlowSink {
    delay: Duration,
    inner: MemoryFactSink,
}

impl FactSink for SlowSink {
    fn append<'a>(
        &'a self,
        table: &'a str,
        batch: &'a RecordBatch,
    ) -> Pin<Box<dyn Future<Output = lq_etl::Result<u64>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.inner.append(table, batch).await
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_does_not_cut_persistence_short() {
    let sink = Arc::new(SlowSink {
        delay: Duration::from_millis(200),
        inner: MemoryFactSink::new(),
    });
    let coordinator = ParallelCoordinator::new(
        Arc::new(LqAggregator::new()),
        FactLoader::new(sink.clone(), "dimensional"),
        Some(Duration::from_millis(100)),
    );

    let outcomes = coordinator.run(&relation()).await;

    assert!(outcomes.iter().all(LevelOutcome::is_persisted), "{outcomes:?}");
    assert_eq!(sink.inner.tables().len(), 6);
    assert_eq!(sink.inner.rows("dimensional.fact_sec_muni"), 4);
    assert_eq!(sink.inner.rows("dimensional.fact_div_muni"), 4);
}
