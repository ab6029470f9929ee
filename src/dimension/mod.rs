//! Dimension store
//!
//! Reference tables for the geography hierarchy, the CNAE classification and
//! the year range. The store is built once per run, validated, and shared
//! read-only by every later stage.

pub mod geography;
pub mod industry;
pub mod year;

use crate::config::DimensionSources;
use crate::error::Result;

pub use geography::{
    GeographyDimensions, MesorregiaoRow, MicrorregiaoRow, MunicipioRow, UfRow,
};
pub use industry::{CnaeRow, IndustryDimension, SectionCodes, normalize_code};
pub use year::YearDimension;

/// All dimension tables of a run
#[derive(Debug, Clone, Default)]
pub struct DimensionStore {
    pub geography: GeographyDimensions,
    pub industry: IndustryDimension,
    pub years: YearDimension,
}

impl DimensionStore {
    #[must_use]
    pub const fn new(
        geography: GeographyDimensions,
        industry: IndustryDimension,
        years: YearDimension,
    ) -> Self {
        Self {
            geography,
            industry,
            years,
        }
    }

    /// Load every dimension from its reference file
    ///
    /// # Errors
    /// Returns a dimension load error if any source is missing, unreadable or
    /// violates the hierarchy.
    pub fn load(sources: &DimensionSources) -> Result<Self> {
        let start = std::time::Instant::now();
        // `cnae_delimiter` is validated as ASCII by the config
        let delimiter = sources.cnae_delimiter as u8;

        let sections = match &sources.section_codes {
            Some(path) => SectionCodes::load_pinned(path, delimiter)?,
            None => SectionCodes::Derived,
        };
        let geography = GeographyDimensions::load(&sources.dir)?;
        let industry = IndustryDimension::load(&sources.cnae_dictionary, delimiter, &sections)?;
        let years = YearDimension::new(sources.first_year, sources.last_year);

        log::info!(
            "Dimension store ready: {} UFs, {} mesoregions, {} microregions, {} municipalities, {} CNAE classes in {:?}",
            geography.ufs().len(),
            geography.mesorregioes().len(),
            geography.microrregioes().len(),
            geography.municipios().len(),
            industry.rows().len(),
            start.elapsed()
        );

        Ok(Self::new(geography, industry, years))
    }
}
