//! Materialized views over the fact tables and their filter indexes.
//!
//! Each view flattens one fact table with its whole geography chain up to
//! the state and the distinct CNAE attributes of its granularity, so the
//! query layer never joins.

use crate::lq::{GeoLevel, IndustryLevel};

/// Name of the view over a fact table
#[must_use]
pub fn view_name(level: GeoLevel, industry: IndustryLevel) -> String {
    format!("{}_mv", level.fact_table(industry))
}

/// Every view, in creation order
#[must_use]
pub fn all_views() -> Vec<(GeoLevel, IndustryLevel)> {
    GeoLevel::ALL
        .into_iter()
        .flat_map(|level| IndustryLevel::ALL.into_iter().map(move |industry| (level, industry)))
        .collect()
}

#[must_use]
pub fn drop_view(schema: &str, level: GeoLevel, industry: IndustryLevel) -> String {
    format!(
        "DROP MATERIALIZED VIEW IF EXISTS {schema}.{} CASCADE",
        view_name(level, industry)
    )
}

/// Geography columns selected at a level, finest first
fn geography_columns(level: GeoLevel) -> Vec<&'static str> {
    let mut columns = Vec::new();
    if level == GeoLevel::Municipality {
        columns.extend(["m.nome AS municipio", "m.id_municipio"]);
    }
    if level <= GeoLevel::Microregion {
        columns.extend(["micro.microrregiao", "micro.id_microrregiao"]);
    }
    columns.extend(["meso.mesorregiao", "meso.id_mesorregiao", "u.uf", "u.id_uf"]);
    columns
}

/// Joins from the fact table `f` up to `dim_uf`
fn geography_joins(schema: &str, level: GeoLevel) -> Vec<String> {
    let mut joins = Vec::new();
    let mut parent = "f";
    if level == GeoLevel::Municipality {
        joins.push(format!(
            "JOIN {schema}.dim_municipio m ON f.id_municipio = m.id_municipio"
        ));
        parent = "m";
    }
    if level <= GeoLevel::Microregion {
        joins.push(format!(
            "JOIN {schema}.dim_microrregiao micro ON {parent}.id_microrregiao = micro.id_microrregiao"
        ));
        parent = "micro";
    }
    joins.push(format!(
        "JOIN {schema}.dim_mesorregiao meso ON {parent}.id_mesorregiao = meso.id_mesorregiao"
    ));
    joins.push(format!("JOIN {schema}.dim_uf u ON meso.id_uf = u.id_uf"));
    joins
}

/// `CREATE MATERIALIZED VIEW` for one fact table
#[must_use]
pub fn create_view(schema: &str, level: GeoLevel, industry: IndustryLevel) -> String {
    let mut select = vec!["f.ano".to_string()];
    select.extend(geography_columns(level).into_iter().map(str::to_string));

    let (cnae_columns, join_on) = match industry {
        IndustryLevel::Section => (
            vec!["secao", "descricao_secao"],
            "f.secao = dc.secao",
        ),
        IndustryLevel::Division => (
            vec!["divisao", "descricao_divisao", "secao", "descricao_secao"],
            "f.divisao = dc.divisao",
        ),
    };
    select.extend(cnae_columns.iter().map(|c| format!("dc.{c}")));
    select.push(format!("f.{}", level.national_column()));
    select.push(format!("f.{}", level.state_column()));

    let joins = geography_joins(schema, level).join("\n    ");
    format!(
        "CREATE MATERIALIZED VIEW {schema}.{view} AS\n\
         SELECT\n    {columns}\n\
         FROM {schema}.{fact} f\n    \
         {joins}\n    \
         JOIN (SELECT DISTINCT {cnae} FROM {schema}.dim_cnae) dc ON {join_on}",
        view = view_name(level, industry),
        columns = select.join(",\n    "),
        fact = level.fact_table(industry),
        cnae = cnae_columns.join(", "),
    )
}

/// Columns indexed on a view: year, state, every geography at or above the
/// level, and the industry codes
#[must_use]
pub fn index_columns(level: GeoLevel, industry: IndustryLevel) -> Vec<&'static str> {
    let mut columns = vec!["ano", "id_uf", "uf"];
    if level == GeoLevel::Municipality {
        columns.extend(["id_municipio", "municipio"]);
    }
    if level <= GeoLevel::Microregion {
        columns.extend(["id_microrregiao", "microrregiao"]);
    }
    columns.extend(["id_mesorregiao", "mesorregiao"]);
    if industry == IndustryLevel::Division {
        columns.push("divisao");
    }
    columns.push("secao");
    columns
}

/// `CREATE INDEX` statements for one view
#[must_use]
pub fn create_indexes(schema: &str, level: GeoLevel, industry: IndustryLevel) -> Vec<String> {
    let view = view_name(level, industry);
    index_columns(level, industry)
        .into_iter()
        .map(|column| {
            format!("CREATE INDEX IF NOT EXISTS idx_{view}_{column} ON {schema}.{view} ({column})")
        })
        .collect()
}
