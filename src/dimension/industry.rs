//! CNAE 2.0 industry classification dimension.
//!
//! The dictionary lists one row per class with its division and section
//! descriptions. Sections carry no numeric code in the dictionary, so each
//! distinct section description is mapped to a dense 1-based integer, either
//! from a pinned lookup table or from the sorted descriptions.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use arrow::array::Array;
use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::util::{in_dimension, open_dimension_file};
use crate::error::{LqError, Result};
use crate::utils::arrow::{string_column, string_values};

pub const DIM_CNAE: &str = "dim_cnae";
const SECTION_CODES: &str = "section_codes";

/// Width of a CNAE class code
pub const CLASSE_WIDTH: usize = 5;
/// Width of a CNAE division code
pub const DIVISAO_WIDTH: usize = 2;

/// One CNAE class with its division and section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnaeRow {
    pub classe: String,
    pub divisao: String,
    pub descricao_divisao: Option<String>,
    pub secao: i32,
    pub descricao_secao: String,
}

/// Keep the digits of a code and left-pad them with zeros to `width`
#[must_use]
pub fn normalize_code(raw: &str, width: usize) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    format!("{digits:0>width$}")
}

/// Mapping from section description to its dense integer code
#[derive(Debug, Clone, Default)]
pub enum SectionCodes {
    /// Externally pinned lookup table
    Pinned(FxHashMap<String, i32>),
    /// Codes assigned from the sorted distinct descriptions
    #[default]
    Derived,
}

impl SectionCodes {
    /// Load a pinned `descricao_secao,secao` table
    pub fn load_pinned(path: &Path, delimiter: u8) -> Result<Self> {
        let batch = in_dimension(read_text_csv(path, SECTION_CODES, delimiter), SECTION_CODES)?;
        let descriptions = required(&batch, SECTION_CODES, "descricao_secao")?;
        let codes = required(&batch, SECTION_CODES, "secao")?;

        let mut table = FxHashMap::default();
        for (description, code) in descriptions.iter().zip(codes.iter()) {
            let (Some(description), Some(code)) = (description, code) else {
                continue;
            };
            let code: i32 = code.trim().parse().map_err(|_| {
                LqError::dimension(SECTION_CODES, format!("invalid section code '{code}'"))
            })?;
            table.insert(description.trim().to_string(), code);
        }
        Ok(Self::Pinned(table))
    }

    /// Resolve codes for every description in `descriptions`
    pub fn assign<'a>(
        &self,
        descriptions: impl Iterator<Item = &'a str>,
    ) -> Result<FxHashMap<String, i32>> {
        match self {
            Self::Pinned(table) => descriptions
                .map(|d| {
                    table.get(d).map(|&code| (d.to_string(), code)).ok_or_else(|| {
                        LqError::dimension(
                            DIM_CNAE,
                            format!("section '{d}' is missing from the pinned section codes"),
                        )
                    })
                })
                .collect(),
            Self::Derived => {
                let sorted: BTreeSet<&str> = descriptions.collect();
                Ok(sorted
                    .into_iter()
                    .zip(1..)
                    .map(|(d, code)| (d.to_string(), code))
                    .collect())
            }
        }
    }
}

/// The CNAE class table indexed by class code
#[derive(Debug, Clone, Default)]
pub struct IndustryDimension {
    rows: Vec<CnaeRow>,
    index: FxHashMap<String, usize>,
}

impl IndustryDimension {
    /// Build from already normalized rows; the first row wins on duplicate classes
    #[must_use]
    pub fn from_rows(rows: Vec<CnaeRow>) -> Self {
        let mut seen = FxHashSet::default();
        let rows: Vec<CnaeRow> = rows
            .into_iter()
            .filter(|r| seen.insert(r.classe.clone()))
            .collect();
        let index = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.classe.clone(), i))
            .collect();
        Self { rows, index }
    }

    /// Load and normalize the CNAE dictionary
    pub fn load(path: &Path, delimiter: u8, sections: &SectionCodes) -> Result<Self> {
        let batch = in_dimension(read_text_csv(path, DIM_CNAE, delimiter), DIM_CNAE)?;
        let classes = required(&batch, DIM_CNAE, "classe")?;
        let divisions = required(&batch, DIM_CNAE, "divisao")?;
        let division_names = required(&batch, DIM_CNAE, "descricao_divisao")?;
        let section_names = required(&batch, DIM_CNAE, "descricao_secao")?;

        let section_values = string_values(&section_names);
        let codes = sections.assign(section_values.iter().flatten().map(|s| s.trim()))?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let (Some(classe), Some(divisao), Some(descricao_secao)) = (
                classes.is_valid(i).then(|| classes.value(i)),
                divisions.is_valid(i).then(|| divisions.value(i)),
                section_values[i].map(str::trim),
            ) else {
                log::warn!("Skipping incomplete CNAE dictionary row {i}");
                continue;
            };
            rows.push(CnaeRow {
                classe: normalize_code(classe, CLASSE_WIDTH),
                divisao: normalize_code(divisao, DIVISAO_WIDTH),
                descricao_divisao: division_names
                    .is_valid(i)
                    .then(|| division_names.value(i).to_string()),
                secao: codes[descricao_secao],
                descricao_secao: descricao_secao.to_string(),
            });
        }

        let dimension = Self::from_rows(rows);
        log::info!(
            "Loaded {} CNAE classes in {} sections from {}",
            dimension.rows.len(),
            codes.len(),
            path.display()
        );
        Ok(dimension)
    }

    #[must_use]
    pub fn rows(&self) -> &[CnaeRow] {
        &self.rows
    }

    /// Look up a class by its normalized 5-digit code
    #[must_use]
    pub fn class(&self, classe: &str) -> Option<&CnaeRow> {
        self.index.get(classe).map(|&i| &self.rows[i])
    }
}

fn required(
    batch: &RecordBatch,
    dimension: &str,
    column: &str,
) -> Result<arrow::array::StringArray> {
    in_dimension(string_column(batch, column), dimension)?
        .ok_or_else(|| LqError::dimension(dimension, format!("missing column '{column}'")))
}

/// Read a delimited file with a header, keeping every column as text so that
/// leading zeros survive
fn read_text_csv(path: &Path, dimension: &str, delimiter: u8) -> Result<RecordBatch> {
    let mut file: File = open_dimension_file(path, dimension)?;
    let format = Format::default()
        .with_header(true)
        .with_delimiter(delimiter);
    let (inferred, _) = format.infer_schema(&mut file, Some(100))?;
    file.rewind()?;

    let text_schema = Arc::new(Schema::new(
        inferred
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let reader = ReaderBuilder::new(Arc::clone(&text_schema))
        .with_format(format)
        .build(file)?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&text_schema, &batches)?)
}
