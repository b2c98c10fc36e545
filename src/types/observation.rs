//! The canonical long-form migration table produced by ingestion.

use crate::types::month::Month;
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeSet;

pub const NATIONALITY: &str = "nationality";
pub const DATE: &str = "date";
pub const PERIOD: &str = "period";
pub const ENCOUNTERS: &str = "encounters";

/// One monthly encounter count for one nationality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Title-cased nationality label.
    pub nationality: String,
    pub month: Month,
    pub encounters: i64,
}

impl Observation {
    pub fn new(nationality: impl Into<String>, month: Month, encounters: i64) -> Self {
        Self {
            nationality: nationality.into(),
            month,
            encounters,
        }
    }
}

/// Deduplicated observations, unique per `(nationality, month)` and sorted by that key.
///
/// Instances are produced by [`crate::ingest::dedup::deduplicate`], which owns the
/// uniqueness guarantee.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    rows: Vec<Observation>,
}

impl ObservationTable {
    pub(crate) fn from_sorted_unique(rows: Vec<Observation>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn nationalities(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|o| o.nationality.as_str()).collect()
    }

    /// First and last month present, or `None` for an empty table.
    pub fn month_range(&self) -> Option<(Month, Month)> {
        let first = self.rows.iter().map(|o| o.month).min()?;
        let last = self.rows.iter().map(|o| o.month).max()?;
        Some((first, last))
    }

    /// Builds the polars representation: `nationality`, `date`, `period`, `encounters`.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let nationalities: Vec<&str> = self.rows.iter().map(|o| o.nationality.as_str()).collect();
        let dates: Vec<Option<NaiveDate>> = self.rows.iter().map(|o| o.month.first_day()).collect();
        let periods: Vec<i32> = self.rows.iter().map(|o| o.month.period_index()).collect();
        let encounters: Vec<i64> = self.rows.iter().map(|o| o.encounters).collect();

        DataFrame::new(vec![
            Column::new(NATIONALITY.into(), nationalities),
            Column::new(DATE.into(), dates),
            Column::new(PERIOD.into(), periods),
            Column::new(ENCOUNTERS.into(), encounters),
        ])
    }
}
