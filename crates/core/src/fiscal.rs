//! Fiscal-year labels (April to March accounting years).

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Month the fiscal year starts in.
const FISCAL_YEAR_START_MONTH: u32 = 4;

/// An accounting year running 1 April to 31 March, labelled `FYyyzz`
/// (e.g. `FY2425` for April 2024 to March 2025).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FiscalYear {
    start_year: i32,
}

impl FiscalYear {
    /// Fiscal year starting in April of `start_year`.
    pub fn starting(start_year: i32) -> Self {
        Self { start_year }
    }

    /// Fiscal year a calendar date belongs to.
    pub fn containing(date: NaiveDate) -> Self {
        let start_year = if date.month() >= FISCAL_YEAR_START_MONTH {
            date.year()
        } else {
            date.year() - 1
        };
        Self { start_year }
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    /// First day of the fiscal year (inclusive).
    pub fn start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.start_year, FISCAL_YEAR_START_MONTH, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the fiscal year (inclusive).
    pub fn end(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.start_year + 1, FISCAL_YEAR_START_MONTH - 1, 31)
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    pub fn label(&self) -> String {
        format!(
            "FY{:02}{:02}",
            self.start_year.rem_euclid(100),
            (self.start_year + 1).rem_euclid(100)
        )
    }

    /// Parse a `FYyyzz` label. Two-digit years are taken to be in the 2000s.
    pub fn parse(label: &str) -> Result<Self, DomainError> {
        let digits = label
            .strip_prefix("FY")
            .filter(|d| d.len() == 4 && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| DomainError::invalid_id(format!("FiscalYear: malformed label '{label}'")))?;

        let first: i32 = digits[..2]
            .parse()
            .map_err(|_| DomainError::invalid_id(format!("FiscalYear: malformed label '{label}'")))?;
        let second: i32 = digits[2..]
            .parse()
            .map_err(|_| DomainError::invalid_id(format!("FiscalYear: malformed label '{label}'")))?;

        if (first + 1) % 100 != second {
            return Err(DomainError::invalid_id(format!(
                "FiscalYear: '{label}' does not span consecutive years"
            )));
        }

        Ok(Self {
            start_year: 2000 + first,
        })
    }
}

impl core::fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.label())
    }
}

impl core::str::FromStr for FiscalYear {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FiscalYear {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FiscalYear> for String {
    fn from(value: FiscalYear) -> Self {
        value.label()
    }
}
