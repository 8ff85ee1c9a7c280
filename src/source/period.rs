use std::fmt;

use crate::error::{Error, Result};

/// One monthly archive, identified by calendar year and month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: u16,
    month: u8,
}

impl Period {
    /// Year must have four digits and month must be 1-12.
    pub fn new(year: u16, month: u8) -> Result<Self> {
        if !(1000..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(Error::InvalidPeriod { year, month });
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    /// All months of `year` from `first` through `last`, inclusive.
    pub fn range(year: u16, first: u8, last: u8) -> Result<Vec<Self>> {
        (first..=last).map(|month| Self::new(year, month)).collect()
    }
}

/// Formats as `YYYYMM`, the prefix used by the trip data archives.
impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}
