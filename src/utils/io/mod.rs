//! Input/output utilities
//!
//! Parquet reading and writing used by the dimension store, the joiner and
//! the test fixtures.

pub mod parquet;

pub use self::parquet::{
    DEFAULT_BATCH_SIZE, find_parquet_files, read_parquet_single_batch, validate_directory,
    write_parquet,
};
