//! Configuration for the location quotient pipeline.
//!
//! A single [`PipelineConfig`] is built at startup (from JSON plus environment
//! overrides) and handed to each component; nothing reads settings globally.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{LqError, Result};

/// Origin format of an input file, set by the upstream normalization stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Converted from the fixed-format `.txt` extracts
    Txt,
    /// Converted from the `.csv` extracts
    Csv,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Txt => f.write_str("txt"),
            Self::Csv => f.write_str("csv"),
        }
    }
}

/// One establishment-year input file and its format tag
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputFile {
    /// Path to the Parquet file
    pub path: PathBuf,
    /// Format the file was produced from
    pub format: SourceFormat,
}

impl InputFile {
    /// Create a new tagged input file
    pub fn new(path: impl Into<PathBuf>, format: SourceFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

/// Connection settings for the relational store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    /// Schema holding dimensions, facts and views
    pub schema: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "rais".to_string(),
            schema: "dimensional".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Connection parameters for `tokio_postgres`
    ///
    /// Values are passed through the builder, so they need no quoting.
    #[must_use]
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.dbname);
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        config
    }
}

/// Locations of the dimension reference files
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DimensionSources {
    /// Directory with `dim_uf.parquet`, `dim_mesorregiao.parquet`,
    /// `dim_microrregiao.parquet` and `dim_municipio.parquet`
    pub dir: PathBuf,
    /// Delimited CNAE 2.0 dictionary
    pub cnae_dictionary: PathBuf,
    /// Field delimiter of the CNAE dictionary
    pub cnae_delimiter: char,
    /// Optional pinned `descricao_secao,secao` table
    pub section_codes: Option<PathBuf>,
    /// First year of the year dimension
    pub first_year: i32,
    /// Last year of the year dimension (inclusive)
    pub last_year: i32,
}

impl Default for DimensionSources {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/dimensions"),
            cnae_dictionary: PathBuf::from("data/dimensions/dicionario_cnae_2.csv"),
            cnae_delimiter: ',',
            section_codes: None,
            first_year: 2007,
            last_year: 2029,
        }
    }
}

/// Configuration for a full pipeline run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub dimensions: DimensionSources,
    /// Explicitly listed input files
    pub inputs: Vec<InputFile>,
    /// Directory scanned for additional `*.parquet` inputs
    pub input_dir: Option<PathBuf>,
    /// Format tag applied to files discovered in `input_dir`
    pub input_format: SourceFormat,
    /// Maximum wait for one geography level, `0` waits forever
    pub level_timeout_secs: u64,
    /// Size of the rayon compute pool
    pub compute_threads: usize,
    /// Keep going with the next file after a file-scoped error
    pub continue_on_file_error: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            dimensions: DimensionSources::default(),
            inputs: Vec::new(),
            input_dir: None,
            input_format: SourceFormat::Csv,
            level_timeout_secs: 3600,
            compute_threads: num_cpus::get(),
            continue_on_file_error: true,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LqError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file and apply environment overrides
    ///
    /// The result is validated after the overrides are applied.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LqError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let mut config = Self::from_json_str(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override connection settings from `LQ_DB_HOST`, `LQ_DB_PASSWORD` and
    /// `LQ_SCHEMA` as returned by `lookup`, then re-validate
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("LQ_DB_HOST") {
            self.database.host = host;
        }
        if let Some(password) = lookup("LQ_DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(schema) = lookup("LQ_SCHEMA") {
            self.database.schema = schema;
        }
        self.validate()
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.first_year > self.dimensions.last_year {
            return Err(LqError::Config(format!(
                "year range {}..={} is empty",
                self.dimensions.first_year, self.dimensions.last_year
            )));
        }
        let schema = &self.database.schema;
        if schema.is_empty() || !schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(LqError::Config(format!("invalid schema name '{schema}'")));
        }
        if !self.dimensions.cnae_delimiter.is_ascii() {
            return Err(LqError::Config("CNAE delimiter must be ASCII".to_string()));
        }
        Ok(())
    }

    /// Bounded wait per geography level
    #[must_use]
    pub const fn level_timeout(&self) -> Option<Duration> {
        if self.level_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.level_timeout_secs))
        }
    }

    /// Explicit inputs followed by files discovered in `input_dir`, sorted by name
    pub fn resolve_inputs(&self) -> Result<Vec<InputFile>> {
        let mut inputs = self.inputs.clone();
        if let Some(dir) = &self.input_dir {
            let mut found = crate::utils::io::parquet::find_parquet_files(dir)?;
            found.sort();
            inputs.extend(
                found
                    .into_iter()
                    .filter(|p| !self.inputs.iter().any(|i| &i.path == p))
                    .map(|p| InputFile::new(p, self.input_format)),
            );
        }
        Ok(inputs)
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline Configuration:")?;
        writeln!(
            f,
            "  Database: {}@{}:{}/{} (schema {})",
            self.database.user,
            self.database.host,
            self.database.port,
            self.database.dbname,
            self.database.schema
        )?;
        writeln!(f, "  Dimensions: {}", self.dimensions.dir.display())?;
        writeln!(f, "  CNAE dictionary: {}", self.dimensions.cnae_dictionary.display())?;
        if let Some(codes) = &self.dimensions.section_codes {
            writeln!(f, "  Pinned section codes: {}", codes.display())?;
        }
        writeln!(
            f,
            "  Years: {}-{}",
            self.dimensions.first_year, self.dimensions.last_year
        )?;
        writeln!(f, "  Explicit inputs: {}", self.inputs.len())?;
        if let Some(dir) = &self.input_dir {
            writeln!(f, "  Input directory: {} ({})", dir.display(), self.input_format)?;
        }
        match self.level_timeout() {
            Some(t) => writeln!(f, "  Level timeout: {t:?}")?,
            None => writeln!(f, "  Level timeout: none")?,
        }
        writeln!(f, "  Compute threads: {}", self.compute_threads)?;
        write!(f, "  Continue on file error: {}", self.continue_on_file_error)
    }
}
