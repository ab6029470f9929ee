//! LQ computation over an enriched relation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use arrow::array::{ArrayRef, Float64Array, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use super::counts::{Counts, Encoded, Key, encode};
use super::{GeoLevel, IndustryLevel, LevelAggregator, LevelResult};
use crate::enrich::{EnrichedRelation, columns};
use crate::error::{LqError, Result};

/// `num / den`, or `0` when the quotient is undefined or not finite
#[must_use]
pub fn safe_ratio(num: f64, den: f64) -> f64 {
    let ratio = num / den;
    if ratio.is_finite() { ratio } else { 0.0 }
}

/// Round to three decimals, ties to even on the scaled value
#[must_use]
pub fn round_index(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 1000.0).round_ties_even() / 1000.0
}

/// Stateless location quotient calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct LqAggregator;

impl LqAggregator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Output schema for a level and granularity
    #[must_use]
    pub fn schema(level: GeoLevel, industry: IndustryLevel) -> SchemaRef {
        let industry_type = match industry {
            IndustryLevel::Section => DataType::Int32,
            IndustryLevel::Division => DataType::Utf8,
        };
        Arc::new(Schema::new(vec![
            Field::new(columns::ANO, DataType::Int32, false),
            Field::new(level.id_column(), DataType::Utf8, false),
            Field::new(industry.column(), industry_type, false),
            Field::new(level.national_column(), DataType::Float64, false),
            Field::new(level.state_column(), DataType::Float64, false),
        ]))
    }

    /// Compute the indices of one level at one industry granularity
    ///
    /// Rows are ordered by (year, state, geography id, industry code).
    ///
    /// # Errors
    /// `Computation` if a needed column is missing or holds nulls.
    pub fn compute(
        &self,
        relation: &EnrichedRelation,
        level: GeoLevel,
        industry: IndustryLevel,
    ) -> Result<RecordBatch> {
        let start = Instant::now();
        let years = encode(&int_values(relation, columns::ANO, level)?);
        let states = encode(&str_values(relation, columns::ID_UF, level)?);
        let geos = encode(&str_values(relation, level.id_column(), level)?);

        let (rows, industry_column): (Vec<IndexRow>, ArrayRef) = match industry {
            IndustryLevel::Section => {
                let codes = encode(&int_values(relation, columns::SECAO, level)?);
                let rows = index_rows(&years, &states, &geos, &codes.ids);
                let column = Int32Array::from_iter_values(
                    rows.iter().map(|r| codes.values[r.key.3 as usize]),
                );
                (rows, Arc::new(column))
            }
            IndustryLevel::Division => {
                let codes = encode(&str_values(relation, columns::DIVISAO, level)?);
                let rows = index_rows(&years, &states, &geos, &codes.ids);
                let column = StringArray::from_iter_values(
                    rows.iter().map(|r| codes.values[r.key.3 as usize]),
                );
                (rows, Arc::new(column))
            }
        };

        let ano = Int32Array::from_iter_values(rows.iter().map(|r| years.values[r.key.0 as usize]));
        let geo =
            StringArray::from_iter_values(rows.iter().map(|r| geos.values[r.key.2 as usize]));
        let nac = Float64Array::from_iter_values(rows.iter().map(|r| r.nac));
        let est = Float64Array::from_iter_values(rows.iter().map(|r| r.est));

        let batch = RecordBatch::try_new(
            Self::schema(level, industry),
            vec![
                Arc::new(ano),
                Arc::new(geo),
                industry_column,
                Arc::new(nac),
                Arc::new(est),
            ],
        )
        .map_err(|e| LqError::computation(level.name(), e.to_string()))?;

        log::debug!(
            "Computed {} {} rows at {} level from {} records in {:?}",
            batch.num_rows(),
            industry.column(),
            level,
            relation.num_rows(),
            start.elapsed()
        );
        Ok(batch)
    }
}

impl LevelAggregator for LqAggregator {
    fn aggregate(&self, relation: &EnrichedRelation, level: GeoLevel) -> Result<LevelResult> {
        let (section, division) = rayon::join(
            || self.compute(relation, level, IndustryLevel::Section),
            || self.compute(relation, level, IndustryLevel::Division),
        );
        Ok(LevelResult {
            section: Some(section?),
            division: Some(division?),
        })
    }
}

struct IndexRow {
    key: Key,
    nac: f64,
    est: f64,
}

/// Both quotients for every (year, state, unit, industry) present, combined
/// by a full outer join with `0` for a missing side
fn index_rows<Y, S, G>(
    years: &Encoded<Y>,
    states: &Encoded<S>,
    geos: &Encoded<G>,
    industry: &[u32],
) -> Vec<IndexRow> {
    let counts = Counts::tally(&years.ids, &states.ids, &geos.ids, industry);
    let count = |c: Option<&u64>| c.copied().unwrap_or_default() as f64;

    let local_share = |key: &Key| {
        let (y, s, g, _) = *key;
        safe_ratio(count(counts.local.get(key)), count(counts.geo_total.get(&(y, s, g))))
    };

    let national: Vec<(Key, f64)> = counts
        .local
        .keys()
        .map(|key| {
            let (y, _, _, i) = *key;
            let share = safe_ratio(
                count(counts.national_industry.get(&(y, i))),
                count(counts.year_total.get(&y)),
            );
            (*key, round_index(safe_ratio(local_share(key), share)))
        })
        .collect();

    let state: Vec<(Key, f64)> = counts
        .local
        .keys()
        .map(|key| {
            let (y, s, _, i) = *key;
            let share = safe_ratio(
                count(counts.state_industry.get(&(y, s, i))),
                count(counts.state_total.get(&(y, s))),
            );
            (*key, round_index(safe_ratio(local_share(key), share)))
        })
        .collect();

    let mut joined: BTreeMap<Key, (f64, f64)> = BTreeMap::new();
    for (key, nac) in national {
        joined.entry(key).or_default().0 = nac;
    }
    for (key, est) in state {
        joined.entry(key).or_default().1 = est;
    }

    joined
        .into_iter()
        .map(|(key, (nac, est))| IndexRow { key, nac, est })
        .collect()
}

fn int_values(relation: &EnrichedRelation, column: &str, level: GeoLevel) -> Result<Vec<i32>> {
    relation
        .int32(column)
        .ok_or_else(|| missing(column, level))?
        .iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| nulls(column, level))
}

fn str_values<'a>(
    relation: &'a EnrichedRelation,
    column: &str,
    level: GeoLevel,
) -> Result<Vec<&'a str>> {
    relation
        .utf8(column)
        .ok_or_else(|| missing(column, level))?
        .iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| nulls(column, level))
}

fn missing(column: &str, level: GeoLevel) -> LqError {
    LqError::computation(level.name(), format!("relation has no column '{column}'"))
}

fn nulls(column: &str, level: GeoLevel) -> LqError {
    LqError::computation(level.name(), format!("column '{column}' contains nulls"))
}
