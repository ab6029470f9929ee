use std::path::PathBuf;

use anyhow::{Context, bail};
use log::{info, warn};
use lq_etl::{Pipeline, PipelineConfig};

#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(config_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        bail!("usage: lq-etl <config.json>");
    };

    let config = PipelineConfig::from_json_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!("{config}");

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.compute_threads)
        .build_global()
        .context("configuring the compute pool")?;

    let summary = Pipeline::new(config).run().await.context("pipeline run failed")?;

    for (path, cause) in &summary.failed_files {
        warn!("Skipped {}: {cause}", path.display());
    }
    for file in &summary.files {
        for outcome in &file.levels {
            if let lq_etl::LevelOutcome::Failed { level, cause } = outcome {
                warn!("{}: {level} level failed: {cause}", file.input.path.display());
            }
        }
    }

    if summary.is_clean() {
        info!("Run completed without failures");
    } else {
        warn!(
            "Run completed with {} skipped files and {} failed levels",
            summary.failed_files.len(),
            summary.failed_levels()
        );
    }
    Ok(())
}
