//! Test support
//!
//! In-memory store doubles and fixture builders shared by unit and
//! integration tests. Nothing here touches a database.


pub use fixtures::{
    EnrichedRow, RawRow, enriched, relation_from_rows, sample_cnae_rows, sample_dimensions,
    sample_geography, write_cnae_dictionary, write_geography, write_raw_input,
};
pub use helpers::{MemoryFactSink, RecordingExecutor};
