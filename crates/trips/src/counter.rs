use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use haulbook_core::{FiscalYear, OrgId};

/// Per-(organization, fiscal year) memo number counter.
///
/// Only ever advanced inside a transaction that also writes whatever the
/// number was minted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalCounter {
    pub org_id: OrgId,
    pub fiscal_year: FiscalYear,
    pub current_number: u64,
    pub fiscal_year_start: NaiveDate,
    pub fiscal_year_end: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FiscalCounter {
    /// Fresh counter at zero with the fiscal year's boundary dates.
    pub fn new(org_id: OrgId, fiscal_year: FiscalYear, at: DateTime<Utc>) -> Self {
        Self {
            org_id,
            fiscal_year,
            current_number: 0,
            fiscal_year_start: fiscal_year.start(),
            fiscal_year_end: fiscal_year.end(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn key(org_id: OrgId, fiscal_year: FiscalYear) -> String {
        format!("{org_id}_{fiscal_year}")
    }

    /// Advance by one and return the new number.
    pub fn advance(&mut self, at: DateTime<Utc>) -> u64 {
        self.current_number += 1;
        self.updated_at = at;
        self.current_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_counter_carries_fiscal_boundaries() {
        let fy = FiscalYear::starting(2024);
        let c = FiscalCounter::new(OrgId::new(), fy, Utc::now());
        assert_eq!(c.current_number, 0);
        assert_eq!(c.fiscal_year_start, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(c.fiscal_year_end, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
    }

    #[test]
    fn advance_is_gap_free() {
        let mut c = FiscalCounter::new(OrgId::new(), FiscalYear::starting(2024), Utc::now());
        let issued: Vec<u64> = (0..5).map(|_| c.advance(Utc::now())).collect();
        assert_eq!(issued, vec![1, 2, 3, 4, 5]);
    }
}
