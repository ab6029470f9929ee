//! Dense encoding of grouping keys and the count tables behind the indices.

use std::hash::Hash;

use itertools::Itertools;
use rustc_hash::FxHashMap;

/// Sorted distinct values of a column with one dense id per row
///
/// Ids follow value order, so sorting by id sorts by value.
pub(super) struct Encoded<T> {
    pub values: Vec<T>,
    pub ids: Vec<u32>,
}

pub(super) fn encode<T: Ord + Hash + Copy>(rows: &[T]) -> Encoded<T> {
    let values: Vec<T> = rows.iter().copied().sorted_unstable().dedup().collect();
    let index: FxHashMap<T, u32> = values.iter().copied().zip(0u32..).collect();
    let ids = rows.iter().map(|v| index[v]).collect();
    Encoded { values, ids }
}

/// (year, state, geography unit, industry code)
pub(super) type Key = (u32, u32, u32, u32);

/// Row counts for every grouping used by the two quotients
#[derive(Debug, Default)]
pub(super) struct Counts {
    /// count(g, i, y), keyed with the state of g
    pub local: FxHashMap<Key, u64>,
    /// count(g, y)
    pub geo_total: FxHashMap<(u32, u32, u32), u64>,
    /// count(i, y)
    pub national_industry: FxHashMap<(u32, u32), u64>,
    /// count(y)
    pub year_total: FxHashMap<u32, u64>,
    /// count(i, y, state)
    pub state_industry: FxHashMap<(u32, u32, u32), u64>,
    /// count(y, state)
    pub state_total: FxHashMap<(u32, u32), u64>,
}

impl Counts {
    /// Tally all groupings in one pass; the slices are parallel row-wise
    pub fn tally(year: &[u32], state: &[u32], geo: &[u32], industry: &[u32]) -> Self {
        let mut counts = Self::default();
        for (((&y, &s), &g), &i) in year.iter().zip(state).zip(geo).zip(industry) {
            *counts.local.entry((y, s, g, i)).or_default() += 1;
            *counts.geo_total.entry((y, s, g)).or_default() += 1;
            *counts.national_industry.entry((y, i)).or_default() += 1;
            *counts.year_total.entry(y).or_default() += 1;
            *counts.state_industry.entry((y, s, i)).or_default() += 1;
            *counts.state_total.entry((y, s)).or_default() += 1;
        }
        counts
    }
}
