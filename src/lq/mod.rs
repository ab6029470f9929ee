//! Location quotient aggregation
//!
//! For a geography level L, unit `g`, industry code `i` and year `y`:
//!
//! ```text
//! share_local    = count(g,i,y) / count(g,y)
//! share_national = count(i,y)   / count(y)
//! share_state    = count(i,y,state(g)) / count(y,state(g))
//! nac = share_local / share_national
//! est = share_local / share_state
//! ```
//!
//! Each level yields two sibling relations, one per industry granularity.

mod aggregator;
mod counts;

use std::fmt;

use arrow::record_batch::RecordBatch;

use crate::enrich::EnrichedRelation;
use crate::enrich::columns;
use crate::error::Result;

pub use aggregator::{LqAggregator, round_index, safe_ratio};

/// Geography granularity of an aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeoLevel {
    Municipality,
    Microregion,
    Mesoregion,
}

impl GeoLevel {
    pub const ALL: [Self; 3] = [Self::Municipality, Self::Microregion, Self::Mesoregion];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Municipality => "municipality",
            Self::Microregion => "microregion",
            Self::Mesoregion => "mesoregion",
        }
    }

    /// Key column of the level in the enriched relation and the fact tables
    #[must_use]
    pub const fn id_column(self) -> &'static str {
        match self {
            Self::Municipality => columns::ID_MUNICIPIO,
            Self::Microregion => columns::ID_MICRORREGIAO,
            Self::Mesoregion => columns::ID_MESORREGIAO,
        }
    }

    /// Short tag used in table and index column names
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Municipality => "muni",
            Self::Microregion => "micro",
            Self::Mesoregion => "meso",
        }
    }

    #[must_use]
    pub fn national_column(self) -> String {
        format!("indice_{}_nac", self.suffix())
    }

    #[must_use]
    pub fn state_column(self) -> String {
        format!("indice_{}_est", self.suffix())
    }

    /// Name of the fact table holding this level at the given granularity
    #[must_use]
    pub fn fact_table(self, industry: IndustryLevel) -> String {
        format!("fact_{}_{}", industry.suffix(), self.suffix())
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Industry granularity of an aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndustryLevel {
    Section,
    Division,
}

impl IndustryLevel {
    pub const ALL: [Self; 2] = [Self::Section, Self::Division];

    /// Key column in the enriched relation and the fact tables
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Section => columns::SECAO,
            Self::Division => columns::DIVISAO,
        }
    }

    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Section => "sec",
            Self::Division => "div",
        }
    }
}

/// The pair of relations produced for one geography level
#[derive(Debug, Clone, Default)]
pub struct LevelResult {
    pub section: Option<RecordBatch>,
    pub division: Option<RecordBatch>,
}

impl LevelResult {
    #[must_use]
    pub const fn get(&self, industry: IndustryLevel) -> Option<&RecordBatch> {
        match industry {
            IndustryLevel::Section => self.section.as_ref(),
            IndustryLevel::Division => self.division.as_ref(),
        }
    }

    /// Rows in the section and division halves
    #[must_use]
    pub fn row_counts(&self) -> (usize, usize) {
        let rows = |b: &Option<RecordBatch>| b.as_ref().map_or(0, RecordBatch::num_rows);
        (rows(&self.section), rows(&self.division))
    }
}

/// Computes the result pair of one geography level
///
/// Implementations are called from the blocking pool and must not assume any
/// ordering relative to the other levels.
pub trait LevelAggregator: Send + Sync {
    fn aggregate(&self, relation: &EnrichedRelation, level: GeoLevel) -> Result<LevelResult>;
}
