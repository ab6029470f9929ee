//! DDL for the star schema: schema reset, dimension tables and fact tables.

use crate::dimension::geography::{DIM_MESORREGIAO, DIM_MICRORREGIAO, DIM_MUNICIPIO, DIM_UF};
use crate::dimension::industry::DIM_CNAE;
use crate::lq::{GeoLevel, IndustryLevel};

/// Dimension tables in foreign key order
pub const DIMENSION_TABLES: [&str; 5] = [
    DIM_UF,
    DIM_MESORREGIAO,
    DIM_MICRORREGIAO,
    DIM_MUNICIPIO,
    DIM_CNAE,
];

/// Geography dimension referenced by a level's fact tables
#[must_use]
pub const fn geo_dimension(level: GeoLevel) -> &'static str {
    match level {
        GeoLevel::Municipality => DIM_MUNICIPIO,
        GeoLevel::Microregion => DIM_MICRORREGIAO,
        GeoLevel::Mesoregion => DIM_MESORREGIAO,
    }
}

/// Width of a level's natural key
const fn geo_key_width(level: GeoLevel) -> usize {
    match level {
        GeoLevel::Municipality => 7,
        GeoLevel::Microregion => 5,
        GeoLevel::Mesoregion => 4,
    }
}

/// Drop the schema with everything in it and create it empty
#[must_use]
pub fn reset_schema(schema: &str) -> String {
    format!("DROP SCHEMA IF EXISTS {schema} CASCADE;\nCREATE SCHEMA {schema};")
}

/// The five dimension tables with their foreign key chain
#[must_use]
pub fn dimension_tables(schema: &str) -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE {schema}.{DIM_UF} (\n    \
             id_uf VARCHAR(2) PRIMARY KEY,\n    \
             uf VARCHAR\n)"
        ),
        format!(
            "CREATE TABLE {schema}.{DIM_MESORREGIAO} (\n    \
             id_mesorregiao VARCHAR(4) PRIMARY KEY,\n    \
             mesorregiao VARCHAR,\n    \
             id_uf VARCHAR(2) NOT NULL REFERENCES {schema}.{DIM_UF}(id_uf)\n)"
        ),
        format!(
            "CREATE TABLE {schema}.{DIM_MICRORREGIAO} (\n    \
             id_microrregiao VARCHAR(5) PRIMARY KEY,\n    \
             microrregiao VARCHAR,\n    \
             id_mesorregiao VARCHAR(4) NOT NULL REFERENCES {schema}.{DIM_MESORREGIAO}(id_mesorregiao)\n)"
        ),
        format!(
            "CREATE TABLE {schema}.{DIM_MUNICIPIO} (\n    \
             id_municipio VARCHAR(7) PRIMARY KEY,\n    \
             nome VARCHAR,\n    \
             id_microrregiao VARCHAR(5) NOT NULL REFERENCES {schema}.{DIM_MICRORREGIAO}(id_microrregiao)\n)"
        ),
        format!(
            "CREATE TABLE {schema}.{DIM_CNAE} (\n    \
             classe VARCHAR(5) PRIMARY KEY,\n    \
             divisao VARCHAR(2) NOT NULL,\n    \
             descricao_divisao VARCHAR,\n    \
             secao INTEGER NOT NULL,\n    \
             descricao_secao VARCHAR\n)"
        ),
    ]
}

/// Fact table for one level and granularity
#[must_use]
pub fn fact_table(schema: &str, level: GeoLevel, industry: IndustryLevel) -> String {
    let table = level.fact_table(industry);
    let geo = level.id_column();
    let width = geo_key_width(level);
    let dimension = geo_dimension(level);
    let industry_column = match industry {
        IndustryLevel::Section => "secao INTEGER NOT NULL",
        IndustryLevel::Division => "divisao VARCHAR(2) NOT NULL",
    };
    format!(
        "CREATE TABLE {schema}.{table} (\n    \
         id SERIAL PRIMARY KEY,\n    \
         ano INTEGER NOT NULL,\n    \
         {geo} VARCHAR({width}) NOT NULL REFERENCES {schema}.{dimension}({geo}),\n    \
         {industry_column},\n    \
         {nac} DOUBLE PRECISION NOT NULL,\n    \
         {est} DOUBLE PRECISION NOT NULL\n)",
        nac = level.national_column(),
        est = level.state_column(),
    )
}

/// All six fact tables
#[must_use]
pub fn fact_tables(schema: &str) -> Vec<String> {
    GeoLevel::ALL
        .into_iter()
        .flat_map(|level| {
            IndustryLevel::ALL
                .into_iter()
                .map(move |industry| fact_table(schema, level, industry))
        })
        .collect()
}

/// The whole destructive rebuild as one script
#[must_use]
pub fn full_rebuild(schema: &str) -> String {
    let mut statements = vec![reset_schema(schema)];
    statements.extend(dimension_tables(schema).into_iter().map(|s| s + ";"));
    statements.extend(fact_tables(schema).into_iter().map(|s| s + ";"));
    statements.join("\n")
}
