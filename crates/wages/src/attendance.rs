use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use haulbook_core::{DomainError, EmployeeId, FiscalYear, OrgId, TripWageId};

/// Calendar month key, serialized as `YYYY-MM`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!("month {month} out of range")));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl core::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl core::str::FromStr for YearMonth {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DomainError::invalid_id(format!("YearMonth: malformed '{s}'"));
        let (y, m) = s.split_once('-').ok_or_else(malformed)?;
        let year = y.parse().map_err(|_| malformed())?;
        let month = m.parse().map_err(|_| malformed())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// One worked day and the settlements that contributed trips to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDay {
    pub date: NaiveDate,
    pub trip_wage_ids: Vec<TripWageId>,
    pub number_of_trips: u32,
}

/// Attendance for one employee in one month of a fiscal year.
///
/// Invariants kept by every mutator:
/// - `number_of_trips == trip_wage_ids.len()` for each day
/// - `total_trips_worked` is the sum over days, `total_days_present` the day count
/// - a settlement id appears in at most one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub org_id: OrgId,
    pub employee_id: EmployeeId,
    pub fiscal_year: FiscalYear,
    pub year_month: YearMonth,
    pub days: Vec<AttendanceDay>,
    pub total_days_present: u32,
    pub total_trips_worked: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(
        org_id: OrgId,
        employee_id: EmployeeId,
        fiscal_year: FiscalYear,
        year_month: YearMonth,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            org_id,
            employee_id,
            fiscal_year,
            year_month,
            days: Vec::new(),
            total_days_present: 0,
            total_trips_worked: 0,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn key(employee_id: EmployeeId, fiscal_year: FiscalYear, year_month: YearMonth) -> String {
        format!("{employee_id}_{fiscal_year}_{year_month}")
    }

    pub fn doc_key(&self) -> String {
        Self::key(self.employee_id, self.fiscal_year, self.year_month)
    }

    pub fn contains(&self, trip_wage_id: TripWageId) -> bool {
        self.days.iter().any(|d| d.trip_wage_ids.contains(&trip_wage_id))
    }

    /// Count `trip_wage_id` as a trip worked on `date`.
    ///
    /// Returns `false` without changes when the settlement is already recorded.
    pub fn add_contribution(
        &mut self,
        date: NaiveDate,
        trip_wage_id: TripWageId,
        at: DateTime<Utc>,
    ) -> bool {
        if self.contains(trip_wage_id) {
            return false;
        }
        match self.days.iter_mut().find(|d| d.date == date) {
            Some(day) => day.trip_wage_ids.push(trip_wage_id),
            None => {
                self.days.push(AttendanceDay {
                    date,
                    trip_wage_ids: vec![trip_wage_id],
                    number_of_trips: 0,
                });
                self.days.sort_by_key(|d| d.date);
            }
        }
        self.recompute(at);
        true
    }

    /// Strip `trip_wage_id` from whichever day holds it, dropping the day if
    /// nothing else contributed to it. Returns `false` if it was not present.
    pub fn remove_contribution(&mut self, trip_wage_id: TripWageId, at: DateTime<Utc>) -> bool {
        let mut removed = false;
        for day in &mut self.days {
            let before = day.trip_wage_ids.len();
            day.trip_wage_ids.retain(|id| *id != trip_wage_id);
            removed |= day.trip_wage_ids.len() != before;
        }
        if !removed {
            return false;
        }
        self.days.retain(|d| !d.trip_wage_ids.is_empty());
        self.recompute(at);
        true
    }

    fn recompute(&mut self, at: DateTime<Utc>) {
        for day in &mut self.days {
            day.number_of_trips = day.trip_wage_ids.len() as u32;
        }
        self.total_days_present = self.days.len() as u32;
        self.total_trips_worked = self.days.iter().map(|d| d.number_of_trips).sum();
        self.updated_at = at;
    }
}
