//! Location quotient indices for Brazilian establishment data.
//!
//! Raw establishment files are enriched against geography and CNAE
//! dimensions, aggregated into national and state location quotients at the
//! municipality, microregion and mesoregion levels, and loaded into a star
//! schema in PostgreSQL.

pub mod config;
pub mod coordinator;
pub mod dimension;
pub mod enrich;
pub mod error;
pub mod loader;
pub mod lq;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod utils;

// Core types
pub use config::{InputFile, PipelineConfig, SourceFormat};
pub use error::{LqError, Result};
pub use pipeline::{Pipeline, RunSummary};

// Components
pub use coordinator::{LevelOutcome, ParallelCoordinator};
pub use dimension::DimensionStore;
pub use enrich::{DataQualityWarning, EnrichedRelation, Enricher, EnrichmentReport};
pub use loader::FactLoader;
pub use lq::{GeoLevel, IndustryLevel, LevelAggregator, LevelResult, LqAggregator};
pub use schema::SchemaManager;
pub use store::{FactSink, PostgresStore, SqlExecutor};

// Arrow types
pub use arrow::record_batch::RecordBatch;
