//! Geography dimensions: UF ⊃ mesoregion ⊃ microregion ⊃ municipality.

use std::path::Path;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::util::{in_dimension, open_dimension_file};
use crate::error::{LqError, Result};
use crate::utils::arrow::get_column;
use crate::utils::io::read_parquet_single_batch;

pub const DIM_UF: &str = "dim_uf";
pub const DIM_MESORREGIAO: &str = "dim_mesorregiao";
pub const DIM_MICRORREGIAO: &str = "dim_microrregiao";
pub const DIM_MUNICIPIO: &str = "dim_municipio";

/// A state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UfRow {
    pub id_uf: String,
    pub uf: Option<String>,
}

/// A mesoregion and its state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MesorregiaoRow {
    pub id_mesorregiao: String,
    pub mesorregiao: Option<String>,
    pub id_uf: String,
}

/// A microregion and its mesoregion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicrorregiaoRow {
    pub id_microrregiao: String,
    pub microrregiao: Option<String>,
    pub id_mesorregiao: String,
}

/// A municipality and its microregion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MunicipioRow {
    pub id_municipio: String,
    pub nome: Option<String>,
    pub id_microrregiao: String,
}

/// The four geography tables, validated as a strict tree
#[derive(Debug, Clone, Default)]
pub struct GeographyDimensions {
    ufs: Vec<UfRow>,
    mesorregioes: Vec<MesorregiaoRow>,
    microrregioes: Vec<MicrorregiaoRow>,
    municipios: Vec<MunicipioRow>,
    municipio_index: FxHashMap<String, usize>,
    microrregiao_ids: FxHashSet<String>,
    mesorregiao_ids: FxHashSet<String>,
    uf_ids: FxHashSet<String>,
}

impl GeographyDimensions {
    /// Build the hierarchy from rows, rejecting duplicate keys and orphans
    pub fn from_rows(
        ufs: Vec<UfRow>,
        mesorregioes: Vec<MesorregiaoRow>,
        microrregioes: Vec<MicrorregiaoRow>,
        municipios: Vec<MunicipioRow>,
    ) -> Result<Self> {
        let uf_ids = unique_keys(DIM_UF, ufs.iter().map(|r| r.id_uf.as_str()))?;
        let mesorregiao_ids = unique_keys(
            DIM_MESORREGIAO,
            mesorregioes.iter().map(|r| r.id_mesorregiao.as_str()),
        )?;
        let microrregiao_ids = unique_keys(
            DIM_MICRORREGIAO,
            microrregioes.iter().map(|r| r.id_microrregiao.as_str()),
        )?;
        unique_keys(DIM_MUNICIPIO, municipios.iter().map(|r| r.id_municipio.as_str()))?;

        check_parents(
            DIM_MESORREGIAO,
            &uf_ids,
            mesorregioes.iter().map(|r| (r.id_mesorregiao.as_str(), r.id_uf.as_str())),
        )?;
        check_parents(
            DIM_MICRORREGIAO,
            &mesorregiao_ids,
            microrregioes
                .iter()
                .map(|r| (r.id_microrregiao.as_str(), r.id_mesorregiao.as_str())),
        )?;
        check_parents(
            DIM_MUNICIPIO,
            &microrregiao_ids,
            municipios
                .iter()
                .map(|r| (r.id_municipio.as_str(), r.id_microrregiao.as_str())),
        )?;

        let municipio_index = municipios
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id_municipio.clone(), i))
            .collect();

        Ok(Self {
            ufs,
            mesorregioes,
            microrregioes,
            municipios,
            municipio_index,
            microrregiao_ids,
            mesorregiao_ids,
            uf_ids,
        })
    }

    /// Load the four `dim_*.parquet` files from a directory
    pub fn load(dir: &Path) -> Result<Self> {
        let ufs: Vec<UfRow> = read_rows(dir, DIM_UF, &["id_uf", "uf"])?;
        let mesorregioes: Vec<MesorregiaoRow> = read_rows(
            dir,
            DIM_MESORREGIAO,
            &["id_mesorregiao", "mesorregiao", "id_uf"],
        )?;
        let microrregioes: Vec<MicrorregiaoRow> = read_rows(
            dir,
            DIM_MICRORREGIAO,
            &["id_microrregiao", "microrregiao", "id_mesorregiao"],
        )?;
        let municipios: Vec<MunicipioRow> = read_rows(
            dir,
            DIM_MUNICIPIO,
            &["id_municipio", "nome", "id_microrregiao"],
        )?;

        Self::from_rows(ufs, mesorregioes, microrregioes, municipios)
    }

    #[must_use]
    pub fn ufs(&self) -> &[UfRow] {
        &self.ufs
    }

    #[must_use]
    pub fn mesorregioes(&self) -> &[MesorregiaoRow] {
        &self.mesorregioes
    }

    #[must_use]
    pub fn microrregioes(&self) -> &[MicrorregiaoRow] {
        &self.microrregioes
    }

    #[must_use]
    pub fn municipios(&self) -> &[MunicipioRow] {
        &self.municipios
    }

    #[must_use]
    pub fn municipio(&self, id: &str) -> Option<&MunicipioRow> {
        self.municipio_index.get(id).map(|&i| &self.municipios[i])
    }

    #[must_use]
    pub fn has_microrregiao(&self, id: &str) -> bool {
        self.microrregiao_ids.contains(id)
    }

    #[must_use]
    pub fn has_mesorregiao(&self, id: &str) -> bool {
        self.mesorregiao_ids.contains(id)
    }

    #[must_use]
    pub fn has_uf(&self, id: &str) -> bool {
        self.uf_ids.contains(id)
    }
}

fn unique_keys<'a>(
    dimension: &str,
    keys: impl Iterator<Item = &'a str>,
) -> Result<FxHashSet<String>> {
    let mut seen = FxHashSet::default();
    for key in keys {
        if !seen.insert(key.to_string()) {
            return Err(LqError::dimension(dimension, format!("duplicate key '{key}'")));
        }
    }
    Ok(seen)
}

fn check_parents<'a>(
    dimension: &str,
    parents: &FxHashSet<String>,
    rows: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<()> {
    for (key, parent) in rows {
        if !parents.contains(parent) {
            return Err(LqError::dimension(
                dimension,
                format!("row '{key}' references unknown parent '{parent}'"),
            ));
        }
    }
    Ok(())
}

/// Read `<dir>/<dimension>.parquet`, coerce the named columns to text and
/// deserialize them into rows
fn read_rows<T>(dir: &Path, dimension: &str, columns: &[&str]) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let path = dir.join(format!("{dimension}.parquet"));
    open_dimension_file(&path, dimension)?;
    let batch = in_dimension(read_parquet_single_batch(&path, Some(columns)), dimension)?;

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for &name in columns {
        let array = in_dimension(get_column(&batch, name, &DataType::Utf8), dimension)?
            .ok_or_else(|| LqError::dimension(dimension, format!("missing column '{name}'")))?;
        fields.push(Field::new(name, DataType::Utf8, true));
        arrays.push(array);
    }
    let text = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| LqError::dimension(dimension, e.to_string()))?;

    let rows: Vec<T> = serde_arrow::from_record_batch(&text)
        .map_err(|e| LqError::dimension(dimension, format!("invalid rows: {e}")))?;
    log::info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}
