//! Enrichment joiner
//!
//! Turns one raw establishment file into the enriched relation: key columns
//! are normalized according to the file's [`SourceFormat`], then every row is
//! inner joined against the dimensions in the order municipality →
//! microregion → mesoregion → CNAE class → UF. Rows without a match are
//! dropped and reported as a [`DataQualityWarning`]; this is the quality gate
//! that keeps orphan keys out of the fact tables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use arrow::array::{Array, ArrayRef, Int32Array, StringArray, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;

use crate::config::{InputFile, SourceFormat};
use crate::dimension::DimensionStore;
use crate::dimension::industry::CLASSE_WIDTH;
use crate::dimension::normalize_code;
use crate::error::{LqError, Result};
use crate::utils::arrow::{int32_column, map_strings, string_column};
use crate::utils::io::read_parquet_single_batch;
use crate::utils::logging::log_data_quality;

/// Column names of the raw and enriched relations
pub mod columns {
    pub const ANO: &str = "ano";
    pub const ID_MUNICIPIO: &str = "id_municipio";
    pub const ID_MICRORREGIAO: &str = "id_microrregiao";
    pub const ID_MESORREGIAO: &str = "id_mesorregiao";
    pub const ID_UF: &str = "id_uf";
    pub const CLASSE: &str = "classe";
    pub const DIVISAO: &str = "divisao";
    pub const SECAO: &str = "secao";
}

/// Key columns every raw input must carry
pub const JOIN_KEYS: [&str; 5] = [
    columns::ID_MUNICIPIO,
    columns::ID_MICRORREGIAO,
    columns::ID_MESORREGIAO,
    columns::ID_UF,
    columns::CLASSE,
];

/// Municipality codes of csv extracts carry a trailing check digit
const CSV_MUNICIPIO_WIDTH: usize = 6;

static ENRICHED_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(columns::ANO, DataType::Int32, false),
        Field::new(columns::ID_MUNICIPIO, DataType::Utf8, false),
        Field::new(columns::ID_MICRORREGIAO, DataType::Utf8, false),
        Field::new(columns::ID_MESORREGIAO, DataType::Utf8, false),
        Field::new(columns::ID_UF, DataType::Utf8, false),
        Field::new(columns::CLASSE, DataType::Utf8, false),
        Field::new(columns::DIVISAO, DataType::Utf8, false),
        Field::new(columns::SECAO, DataType::Int32, false),
    ]))
});

/// Schema of the enriched relation
#[must_use]
pub fn enriched_schema() -> SchemaRef {
    Arc::clone(&ENRICHED_SCHEMA)
}

/// One row per establishment with all dimension keys resolved
///
/// Cloning is cheap: the columns are reference counted and never mutated, so
/// the same relation can be handed to every aggregation worker.
#[derive(Debug, Clone)]
pub struct EnrichedRelation {
    batch: RecordBatch,
}

impl EnrichedRelation {
    /// Wrap a batch that already has the enriched schema
    pub fn try_new(batch: RecordBatch) -> Result<Self> {
        let expected = enriched_schema();
        let schema = batch.schema();
        for field in expected.fields() {
            let matches = schema
                .field_with_name(field.name())
                .is_ok_and(|f| f.data_type() == field.data_type());
            if !matches {
                return Err(LqError::Arrow(arrow::error::ArrowError::SchemaError(format!(
                    "enriched relation needs column '{}' of type {:?}",
                    field.name(),
                    field.data_type()
                ))));
            }
        }
        Ok(Self { batch })
    }

    #[must_use]
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Distinct years present, ascending
    #[must_use]
    pub fn years(&self) -> Vec<i32> {
        self.int32(columns::ANO)
            .map(|a| a.iter().flatten().sorted_unstable().dedup().collect())
            .unwrap_or_default()
    }

    /// A string column of the relation
    #[must_use]
    pub fn utf8(&self, name: &str) -> Option<&StringArray> {
        self.batch.column_by_name(name)?.as_any().downcast_ref()
    }

    /// An integer column of the relation
    #[must_use]
    pub fn int32(&self, name: &str) -> Option<&Int32Array> {
        self.batch.column_by_name(name)?.as_any().downcast_ref()
    }
}

/// Join step at which a row was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinStage {
    /// Row had no year
    Year,
    Municipio,
    Microrregiao,
    Mesorregiao,
    Cnae,
    Uf,
}

impl JoinStage {
    pub const ALL: [Self; 6] = [
        Self::Year,
        Self::Municipio,
        Self::Microrregiao,
        Self::Mesorregiao,
        Self::Cnae,
        Self::Uf,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Year => "ano",
            Self::Municipio => "dim_municipio",
            Self::Microrregiao => "dim_microrregiao",
            Self::Mesorregiao => "dim_mesorregiao",
            Self::Cnae => "dim_cnae",
            Self::Uf => "dim_uf",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Non-fatal data quality finding for one input file
#[derive(Debug, Clone, PartialEq)]
pub enum DataQualityWarning {
    /// Rows removed by the inner joins
    RowsDropped {
        source: PathBuf,
        lost: usize,
        total: usize,
    },
    /// Years with no entry in the year dimension
    YearsOutOfRange { source: PathBuf, years: Vec<i32> },
}

impl DataQualityWarning {
    /// Share of rows lost, in percent
    #[must_use]
    pub fn loss_percentage(&self) -> Option<f64> {
        match self {
            Self::RowsDropped { lost, total, .. } if *total > 0 => {
                Some(*lost as f64 * 100.0 / *total as f64)
            }
            _ => None,
        }
    }
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowsDropped {
                source,
                lost,
                total,
            } => write!(
                f,
                "{}: {lost} of {total} rows ({:.2}%) dropped by dimension joins",
                source.display(),
                self.loss_percentage().unwrap_or_default()
            ),
            Self::YearsOutOfRange { source, years } => write!(
                f,
                "{}: years {years:?} are outside the year dimension",
                source.display()
            ),
        }
    }
}

/// Outcome of enriching one file
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentReport {
    pub source: PathBuf,
    pub input_rows: usize,
    pub output_rows: usize,
    /// Rows dropped at each join stage, in join order
    pub dropped: Vec<(JoinStage, usize)>,
    pub warnings: Vec<DataQualityWarning>,
}

impl EnrichmentReport {
    #[must_use]
    pub const fn lost(&self) -> usize {
        self.input_rows - self.output_rows
    }
}

/// Joins raw establishment relations against the dimension store
#[derive(Debug, Clone)]
pub struct Enricher {
    dimensions: Arc<DimensionStore>,
}

impl Enricher {
    #[must_use]
    pub const fn new(dimensions: Arc<DimensionStore>) -> Self {
        Self { dimensions }
    }

    /// Read and enrich one input file
    ///
    /// # Errors
    /// `JoinKey` if a key column is absent, IO/Parquet errors if the file
    /// cannot be read.
    pub fn enrich_file(&self, input: &InputFile) -> Result<(EnrichedRelation, EnrichmentReport)> {
        let mut wanted = JOIN_KEYS.to_vec();
        wanted.push(columns::ANO);
        let batch = read_parquet_single_batch(&input.path, Some(wanted.as_slice()))?;
        self.enrich_batch(&batch, input)
    }

    /// Enrich an already loaded raw relation
    pub fn enrich_batch(
        &self,
        raw: &RecordBatch,
        input: &InputFile,
    ) -> Result<(EnrichedRelation, EnrichmentReport)> {
        let keys = RawKeys::normalize(raw, input)?;
        let total = raw.num_rows();

        let geography = &self.dimensions.geography;
        let industry = &self.dimensions.industry;
        let mut dropped = [0usize; JoinStage::ALL.len()];
        let mut kept: Vec<u32> = Vec::with_capacity(total);
        let mut divisoes: Vec<&str> = Vec::with_capacity(total);
        let mut secoes: Vec<i32> = Vec::with_capacity(total);

        for row in 0..total {
            let stage = if keys.ano.is_null(row) {
                Some(JoinStage::Year)
            } else if !present(&keys.municipio, row)
                || geography.municipio(keys.municipio.value(row)).is_none()
            {
                Some(JoinStage::Municipio)
            } else if !present(&keys.microrregiao, row)
                || !geography.has_microrregiao(keys.microrregiao.value(row))
            {
                Some(JoinStage::Microrregiao)
            } else if !present(&keys.mesorregiao, row)
                || !geography.has_mesorregiao(keys.mesorregiao.value(row))
            {
                Some(JoinStage::Mesorregiao)
            } else {
                match present(&keys.classe, row)
                    .then(|| industry.class(keys.classe.value(row)))
                    .flatten()
                {
                    None => Some(JoinStage::Cnae),
                    Some(_) if !present(&keys.uf, row) || !geography.has_uf(keys.uf.value(row)) => {
                        Some(JoinStage::Uf)
                    }
                    Some(class) => {
                        kept.push(u32::try_from(row).map_err(|_| {
                            LqError::Config(format!("{} has too many rows", input.path.display()))
                        })?);
                        divisoes.push(&class.divisao);
                        secoes.push(class.secao);
                        None
                    }
                }
            };
            if let Some(stage) = stage {
                dropped[stage.index()] += 1;
            }
        }

        let indices = UInt32Array::from(kept);
        let columns: Vec<ArrayRef> = vec![
            take(&keys.ano, &indices, None)?,
            take(&keys.municipio, &indices, None)?,
            take(&keys.microrregiao, &indices, None)?,
            take(&keys.mesorregiao, &indices, None)?,
            take(&keys.uf, &indices, None)?,
            take(&keys.classe, &indices, None)?,
            Arc::new(StringArray::from(divisoes)),
            Arc::new(Int32Array::from(secoes)),
        ];
        let relation =
            EnrichedRelation::try_new(RecordBatch::try_new(enriched_schema(), columns)?)?;

        let mut report = EnrichmentReport {
            source: input.path.clone(),
            input_rows: total,
            output_rows: relation.num_rows(),
            dropped: JoinStage::ALL
                .into_iter()
                .filter(|s| dropped[s.index()] > 0)
                .map(|s| (s, dropped[s.index()]))
                .collect(),
            warnings: Vec::new(),
        };

        if report.lost() > 0 {
            for (stage, count) in &report.dropped {
                log::debug!(
                    "{}: {count} rows without match in {}",
                    input.path.display(),
                    stage.name()
                );
            }
            report.warnings.push(DataQualityWarning::RowsDropped {
                source: input.path.clone(),
                lost: report.lost(),
                total,
            });
        }

        let outside: Vec<i32> = relation
            .years()
            .into_iter()
            .filter(|&y| self.dimensions.years.id_of(y).is_none())
            .collect();
        if !outside.is_empty() {
            report.warnings.push(DataQualityWarning::YearsOutOfRange {
                source: input.path.clone(),
                years: outside,
            });
        }

        report.warnings.iter().for_each(log_data_quality);
        log::info!(
            "Enriched {}: {} of {} rows kept",
            input.path.display(),
            report.output_rows,
            report.input_rows
        );
        Ok((relation, report))
    }
}

/// Normalized key columns of a raw relation
struct RawKeys {
    ano: Int32Array,
    municipio: StringArray,
    microrregiao: StringArray,
    mesorregiao: StringArray,
    uf: StringArray,
    classe: StringArray,
}

impl RawKeys {
    fn normalize(raw: &RecordBatch, input: &InputFile) -> Result<Self> {
        let path = &input.path;
        let key = |name: &str| -> Result<StringArray> {
            string_column(raw, name)?.ok_or_else(|| LqError::join_key(path, name))
        };

        let municipio = key(columns::ID_MUNICIPIO)?;
        let microrregiao = key(columns::ID_MICRORREGIAO)?;
        let mesorregiao = key(columns::ID_MESORREGIAO)?;
        let uf = key(columns::ID_UF)?;
        let classe = key(columns::CLASSE)?;

        let ano = match (int32_column(raw, columns::ANO)?, input.format) {
            (Some(ano), _) => ano,
            (None, SourceFormat::Txt) => {
                let year = year_from_path(path)
                    .ok_or_else(|| LqError::join_key(path, columns::ANO))?;
                Int32Array::from(vec![year; raw.num_rows()])
            }
            (None, SourceFormat::Csv) => return Err(LqError::join_key(path, columns::ANO)),
        };

        let municipio = match input.format {
            SourceFormat::Csv => {
                map_strings(&municipio, |m| m.chars().take(CSV_MUNICIPIO_WIDTH).collect())
            }
            SourceFormat::Txt => municipio,
        };
        let classe = map_strings(&classe, |c| normalize_code(c, CLASSE_WIDTH));

        Ok(Self {
            ano,
            municipio,
            microrregiao,
            mesorregiao,
            uf,
            classe,
        })
    }
}

fn present(array: &StringArray, row: usize) -> bool {
    array.is_valid(row)
}

/// Year encoded in the last four characters of a file stem, e.g. `ESTB2019`
#[must_use]
pub fn year_from_path(path: &Path) -> Option<i32> {
    let stem = path.file_stem()?.to_str()?;
    let tail = stem.get(stem.len().checked_sub(4)?..)?;
    tail.parse().ok()
}
