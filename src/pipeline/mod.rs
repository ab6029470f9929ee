//! Pipeline driver
//!
//! One run: load dimensions (fail fast, before anything destructive), rebuild
//! the schema, populate dimension tables, then enrich and aggregate each input
//! file in turn, and finally rebuild the materialized views.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};

use crate::config::{InputFile, PipelineConfig};
use crate::coordinator::{LevelOutcome, ParallelCoordinator};
use crate::dimension::DimensionStore;
use crate::enrich::{Enricher, EnrichmentReport};
use crate::error::{LqError, Result};
use crate::loader::FactLoader;
use crate::lq::{LevelAggregator, LqAggregator};
use crate::schema::{SchemaManager, ViewReport};
use crate::store::{FactSink, PostgresStore, SqlExecutor};
use crate::utils::logging::{
    create_file_progress_bar, create_spinner, finish_progress_bar, log_operation_complete,
    log_operation_start,
};

/// What happened to one input file
#[derive(Debug)]
pub struct FileSummary {
    pub input: InputFile,
    pub report: EnrichmentReport,
    pub levels: Vec<LevelOutcome>,
}

impl FileSummary {
    #[must_use]
    pub fn failed_levels(&self) -> usize {
        self.levels.iter().filter(|o| !o.is_persisted()).count()
    }
}

/// Result of a whole run
#[derive(Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub dimension_rows: Vec<(&'static str, u64)>,
    pub files: Vec<FileSummary>,
    /// Files skipped because of a file-scoped error
    pub failed_files: Vec<(PathBuf, LqError)>,
    pub views: ViewReport,
}

impl RunSummary {
    /// True when every file and every level went through
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed_files.is_empty() && self.files.iter().all(|f| f.failed_levels() == 0)
    }

    #[must_use]
    pub fn failed_levels(&self) -> usize {
        self.files.iter().map(FileSummary::failed_levels).sum()
    }
}

/// Wires the components of a run together
pub struct Pipeline {
    config: PipelineConfig,
    executor: Arc<dyn SqlExecutor>,
    sink: Arc<dyn FactSink>,
    aggregator: Arc<dyn LevelAggregator>,
}

impl Pipeline {
    /// Pipeline writing to the PostgreSQL database named in `config`
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let store = Arc::new(PostgresStore::new(config.database.clone()));
        Self::with_backends(config, store.clone(), store, Arc::new(LqAggregator::new()))
    }

    /// Pipeline with explicit store and aggregation backends
    pub fn with_backends(
        config: PipelineConfig,
        executor: Arc<dyn SqlExecutor>,
        sink: Arc<dyn FactSink>,
        aggregator: Arc<dyn LevelAggregator>,
    ) -> Self {
        Self {
            config,
            executor,
            sink,
            aggregator,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load dimensions and inputs from the configured sources and run
    pub async fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let sources = self.config.dimensions.clone();
        log_operation_start("Loading dimensions from", sources.dir.display());
        let spinner = create_spinner(Some("Loading dimensions"));
        let loaded = tokio::task::spawn_blocking(move || DimensionStore::load(&sources))
            .await
            .map_err(|e| LqError::Task(e.to_string()));
        spinner.finish_and_clear();
        let dimensions = loaded??;
        log::info!("Dimensions loaded in {:?}", start.elapsed());

        let inputs = self.config.resolve_inputs()?;
        self.run_with(dimensions, inputs).await
    }

    /// Run over an already loaded dimension store and a list of inputs
    pub async fn run_with(
        &self,
        dimensions: DimensionStore,
        inputs: Vec<InputFile>,
    ) -> Result<RunSummary> {
        let started_at = Local::now();
        let schema = &self.config.database.schema;
        let dimensions = Arc::new(dimensions);

        let manager = SchemaManager::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.sink),
            schema.clone(),
        );
        manager.full_rebuild().await?;
        let dimension_rows = manager.load_dimensions(&dimensions).await?;

        let enricher = Enricher::new(Arc::clone(&dimensions));
        let coordinator = ParallelCoordinator::new(
            Arc::clone(&self.aggregator),
            FactLoader::new(Arc::clone(&self.sink), schema.clone()),
            self.config.level_timeout(),
        );

        let mut files = Vec::with_capacity(inputs.len());
        let mut failed_files = Vec::new();
        let pb =
            create_file_progress_bar(inputs.len() as u64, Some("Computing location quotients"));

        for input in inputs {
            let file_start = Instant::now();
            pb.set_message(input.path.display().to_string());

            let task_enricher = enricher.clone();
            let task_input = input.clone();
            let enriched =
                tokio::task::spawn_blocking(move || task_enricher.enrich_file(&task_input))
                    .await
                    .map_err(|e| LqError::Task(e.to_string()))?;

            let (relation, report) = match enriched {
                Ok(enriched) => enriched,
                Err(e) if e.is_file_scoped() && self.config.continue_on_file_error => {
                    log::error!("Skipping {}: {e}", input.path.display());
                    failed_files.push((input.path.clone(), e));
                    pb.inc(1);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let levels = coordinator.run(&relation).await;
            log_operation_complete(
                "processed",
                input.path.display(),
                relation.num_rows(),
                Some(file_start.elapsed()),
            );
            files.push(FileSummary {
                input,
                report,
                levels,
            });
            pb.inc(1);
        }
        finish_progress_bar(&pb, Some("All input files processed"));

        let views = manager.build_views().await?;

        let summary = RunSummary {
            started_at,
            finished_at: Local::now(),
            dimension_rows,
            files,
            failed_files,
            views,
        };
        log::info!(
            "Run finished in {}s: {} files processed, {} skipped, {} failed levels",
            (summary.finished_at - summary.started_at).num_seconds(),
            summary.files.len(),
            summary.failed_files.len(),
            summary.failed_levels()
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("schema", &self.config.database.schema)
            .field("continue_on_file_error", &self.config.continue_on_file_error)
            .finish_non_exhaustive()
    }
}
