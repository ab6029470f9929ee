//! Shared helpers: Arrow column access, Parquet IO, logging and test doubles.

pub mod arrow;
pub mod io;
pub mod logging;
pub mod test;

pub use io::parquet::{find_parquet_files, read_parquet_single_batch};
pub use logging::{log_operation_complete, log_operation_start, log_warning};
