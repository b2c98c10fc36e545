//! Auxiliary tables joined onto the observation table by the fuser.

use crate::types::observation::{NATIONALITY, PERIOD};
use polars::prelude::*;
use std::fmt;
use std::fmt::{Display, Formatter};

pub const COUNTRY_CODE: &str = "country_code";

/// How a covariate attaches to an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CovariateKind {
    /// One value per nationality (e.g. distance to the border), joined on `nationality`.
    Static,
    /// One value per month shared by every nationality, joined on `period`.
    MonthlyGlobal,
    /// One value per `(country_code, period)`, joined through the nationality crosswalk.
    CountryMonthly,
}

impl CovariateKind {
    /// Columns that identify a row of a table of this kind.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            CovariateKind::Static => &[NATIONALITY],
            CovariateKind::MonthlyGlobal => &[PERIOD],
            CovariateKind::CountryMonthly => &[COUNTRY_CODE, PERIOD],
        }
    }
}

impl Display for CovariateKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CovariateKind::Static => write!(f, "static"),
            CovariateKind::MonthlyGlobal => write!(f, "monthly-global"),
            CovariateKind::CountryMonthly => write!(f, "country-monthly"),
        }
    }
}

/// How duplicate keys inside one covariate table are collapsed before joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    #[default]
    First,
    Sum,
}

/// A named covariate source ready to be fused.
///
/// The frame must contain the key columns of its [`CovariateKind`] plus one or more value
/// columns. An empty frame is valid and fuses as all nulls.
#[derive(Debug, Clone)]
pub struct CovariateTable {
    pub name: String,
    pub kind: CovariateKind,
    pub frame: DataFrame,
    pub prefix: Option<String>,
    pub aggregation: Aggregation,
}

impl CovariateTable {
    pub fn new(name: impl Into<String>, kind: CovariateKind, frame: DataFrame) -> Self {
        Self {
            name: name.into(),
            kind,
            frame,
            prefix: None,
            aggregation: Aggregation::default(),
        }
    }

    pub fn per_country(name: impl Into<String>, frame: DataFrame) -> Self {
        Self::new(name, CovariateKind::Static, frame)
    }

    pub fn monthly_global(name: impl Into<String>, frame: DataFrame) -> Self {
        Self::new(name, CovariateKind::MonthlyGlobal, frame)
    }

    pub fn country_monthly(name: impl Into<String>, frame: DataFrame) -> Self {
        Self::new(name, CovariateKind::CountryMonthly, frame)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Value columns as they appear in the source frame.
    pub fn value_columns(&self) -> Vec<String> {
        let keys = self.kind.key_columns();
        self.frame
            .get_column_names()
            .into_iter()
            .filter(|name| !keys.contains(&name.as_str()))
            .map(|name| name.to_string())
            .collect()
    }

    /// Value column names after the optional prefix is applied.
    pub fn output_column(&self, column: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{column}"),
            None => column.to_string(),
        }
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.value_columns()
            .iter()
            .map(|c| self.output_column(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_and_output_columns() -> Result<(), Box<dyn std::error::Error>> {
        let frame = DataFrame::new(vec![
            Column::new(COUNTRY_CODE.into(), ["MX"]),
            Column::new(PERIOD.into(), [24240i32]),
            Column::new("event_count".into(), [3.0f64]),
        ])?;
        let table = CovariateTable::country_monthly("gdelt", frame).with_prefix("gdelt_");
        assert_eq!(table.value_columns(), vec!["event_count".to_string()]);
        assert_eq!(table.output_columns(), vec!["gdelt_event_count".to_string()]);
        assert!(!table.is_empty());
        Ok(())
    }
}
