//! Parallel coordinator
//!
//! Runs the three geography levels of one enriched relation as independent
//! tasks. Each task computes its pair on the blocking pool and persists it
//! through the fact loader. A failure in one level (error, panic or timeout)
//! is captured in that level's [`LevelOutcome`] and never reaches the others.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::task::JoinError;

use crate::enrich::EnrichedRelation;
use crate::error::{LqError, Result};
use crate::loader::{FactLoader, PersistedCounts};
use crate::lq::{GeoLevel, LevelAggregator};

/// Result of one level task
#[derive(Debug)]
pub enum LevelOutcome {
    Persisted {
        level: GeoLevel,
        counts: PersistedCounts,
        elapsed: Duration,
    },
    Failed {
        level: GeoLevel,
        cause: LqError,
    },
}

impl LevelOutcome {
    #[must_use]
    pub const fn level(&self) -> GeoLevel {
        match self {
            Self::Persisted { level, .. } | Self::Failed { level, .. } => *level,
        }
    }

    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }
}

/// Fixed fan-out of one task per geography level
#[derive(Clone)]
pub struct ParallelCoordinator {
    aggregator: Arc<dyn LevelAggregator>,
    loader: FactLoader,
    timeout: Option<Duration>,
}

impl ParallelCoordinator {
    /// # Arguments
    /// * `aggregator` - Computes the result pair of a level
    /// * `loader` - Persists the pair
    /// * `timeout` - Upper bound for one level's aggregation, `None` waits forever
    pub fn new(
        aggregator: Arc<dyn LevelAggregator>,
        loader: FactLoader,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            aggregator,
            loader,
            timeout,
        }
    }

    /// Run all levels over `relation` and wait for every one of them
    ///
    /// Outcomes are returned in [`GeoLevel::ALL`] order.
    pub async fn run(&self, relation: &EnrichedRelation) -> Vec<LevelOutcome> {
        let handles = GeoLevel::ALL.map(|level| {
            let aggregator = Arc::clone(&self.aggregator);
            let loader = self.loader.clone();
            let relation = relation.clone();
            let timeout = self.timeout;
            tokio::spawn(run_level(aggregator, loader, relation, level, timeout))
        });

        let results = join_all(handles).await;

        GeoLevel::ALL
            .into_iter()
            .zip(results)
            .map(|(level, joined)| {
                let outcome = joined
                    .map_err(|e| join_failure(level, e))
                    .and_then(|result| result);
                match outcome {
                    Ok((counts, elapsed)) => {
                        log::info!(
                            "{level} level persisted {} section and {} division rows in {elapsed:?}",
                            counts.section,
                            counts.division
                        );
                        LevelOutcome::Persisted {
                            level,
                            counts,
                            elapsed,
                        }
                    }
                    Err(cause) => {
                        log::error!("{level} level failed: {cause}");
                        LevelOutcome::Failed { level, cause }
                    }
                }
            })
            .collect()
    }
}

/// Aggregate under the timeout, then persist
///
/// Persistence is never cut short, so a level's fact tables are not left
/// with one half written by a cancelled COPY.
async fn run_level(
    aggregator: Arc<dyn LevelAggregator>,
    loader: FactLoader,
    relation: EnrichedRelation,
    level: GeoLevel,
    timeout: Option<Duration>,
) -> Result<(PersistedCounts, Duration)> {
    let start = Instant::now();
    let task = tokio::task::spawn_blocking(move || aggregator.aggregate(&relation, level));
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
            LqError::computation(level.name(), format!("timed out after {limit:?}"))
        })?,
        None => task.await,
    };
    let result = joined.map_err(|e| join_failure(level, e))??;

    let (section, division) = result.row_counts();
    log::debug!("{level} level computed {section} section and {division} division rows");

    let counts = loader.append_pair(level, &result).await?;
    Ok((counts, start.elapsed()))
}

fn join_failure(level: GeoLevel, error: JoinError) -> LqError {
    if error.is_panic() {
        let message = panic_message(error.into_panic());
        LqError::computation(level.name(), format!("task panicked: {message}"))
    } else {
        LqError::computation(level.name(), format!("Task join error: {error}"))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

impl std::fmt::Debug for ParallelCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelCoordinator")
            .field("loader", &self.loader)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
