//! Synthetic year dimension covering a fixed range independent of the data.

/// Inclusive range of years known to the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearDimension {
    first: i32,
    last: i32,
}

impl YearDimension {
    #[must_use]
    pub const fn new(first: i32, last: i32) -> Self {
        Self { first, last }
    }

    #[must_use]
    pub const fn contains(&self, ano: i32) -> bool {
        ano >= self.first && ano <= self.last
    }

    /// 1-based `id_ano` of a year, `None` outside the range
    #[must_use]
    pub const fn id_of(&self, ano: i32) -> Option<i32> {
        if self.contains(ano) {
            Some(ano - self.first + 1)
        } else {
            None
        }
    }
}

impl Default for YearDimension {
    fn default() -> Self {
        Self::new(2007, 2029)
    }
}
