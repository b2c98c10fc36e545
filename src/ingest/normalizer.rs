//! Reshapes wide encounter sheets (one column per month) into long-form observations.

use crate::ingest::error::IngestError;
use crate::types::month::Month;
use crate::types::observation::Observation;
use log::{debug, info};
use polars::prelude::*;

/// Label fragments marking aggregate or unattributed rows.
pub const DEFAULT_EXCLUSIONS: [&str; 4] = ["total", "other countries", "all other", "unknown"];

/// Turns a wide sheet into [`Observation`]s.
///
/// The first column holds free-text nationality labels; every other column is a period
/// header such as `"Oct 2019"` or `"Oct-19"`. Labels are trimmed and title-cased, and rows
/// whose label contains one of the exclusion fragments (case-insensitive) are dropped.
/// Cells are read as integers after removing thousands separators; anything that does not
/// parse counts as zero.
#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    exclusions: Vec<String>,
}

impl Default for SchemaNormalizer {
    fn default() -> Self {
        Self::with_exclusions(DEFAULT_EXCLUSIONS)
    }
}

impl SchemaNormalizer {
    pub fn with_exclusions<I, S>(exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            exclusions: exclusions
                .into_iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Returns the cleaned label, or `None` if the row must be dropped.
    pub fn clean_label(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lowered = trimmed.to_lowercase();
        if self.exclusions.iter().any(|e| lowered.contains(e.as_str())) {
            return None;
        }
        Some(title_case(trimmed))
    }

    /// Melts `wide` into long rows.
    ///
    /// # Arguments
    ///
    /// * `sheet` - Name used in log lines and errors.
    /// * `wide` - The sheet as read from CSV. Column types are not assumed; every column is
    ///   cast to string before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MissingPeriodColumns`] if the sheet has only a label column and
    /// [`IngestError::NoParseablePeriods`] if none of the headers is a recognisable month.
    pub fn normalize(&self, sheet: &str, wide: &DataFrame) -> Result<Vec<Observation>, IngestError> {
        let columns = wide.get_columns();
        if columns.len() < 2 {
            return Err(IngestError::MissingPeriodColumns {
                sheet: sheet.to_string(),
            });
        }
        let reshape_err = |source: PolarsError| IngestError::Reshape {
            sheet: sheet.to_string(),
            source,
        };

        let labels = columns[0].cast(&DataType::String).map_err(reshape_err)?;
        let labels = labels.str().map_err(reshape_err)?;

        let mut periods: Vec<(Month, Column)> = Vec::with_capacity(columns.len() - 1);
        for column in &columns[1..] {
            match Month::parse_label(column.name().as_str()) {
                Some(month) => {
                    let values = column.cast(&DataType::String).map_err(reshape_err)?;
                    periods.push((month, values));
                }
                None => debug!("Sheet '{}': skipping column '{}'", sheet, column.name()),
            }
        }
        if periods.is_empty() {
            return Err(IngestError::NoParseablePeriods {
                sheet: sheet.to_string(),
            });
        }

        let mut observations = Vec::with_capacity(wide.height() * periods.len());
        for row in 0..wide.height() {
            let Some(nationality) = labels.get(row).and_then(|raw| self.clean_label(raw)) else {
                continue;
            };
            for (month, values) in &periods {
                let raw = values.str().map_err(reshape_err)?.get(row);
                observations.push(Observation::new(
                    nationality.clone(),
                    *month,
                    parse_count(raw),
                ));
            }
        }

        info!(
            "Sheet '{}': {} long rows from {} period columns",
            sheet,
            observations.len(),
            periods.len()
        );
        Ok(observations)
    }
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut previous_is_letter = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}

/// Floor-to-zero integer parsing: missing, blank and non-numeric cells become 0.
pub fn parse_count(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return 0;
    };
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    if let Ok(value) = cleaned.parse::<i64>() {
        return value;
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value as i64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> DataFrame {
        DataFrame::new(vec![
            Column::new(
                "Citizenship".into(),
                [
                    Some(" MEXICO "),
                    Some("Guatemala"),
                    Some("Total"),
                    Some("All Other Countries"),
                    Some("unknown"),
                    None,
                ],
            ),
            Column::new(
                "Jan 2020".into(),
                ["1,234", "5", "9,999", "1", "1", "1"],
            ),
            Column::new("Feb 2020".into(), ["n/a", "", "1", "1", "1", "1"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_wide_to_long_yields_two_rows_per_kept_label() -> Result<(), IngestError> {
        let rows = SchemaNormalizer::default().normalize("primary", &sheet())?;
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows,
            vec![
                Observation::new("Mexico", Month::new(1, 2020), 1234),
                Observation::new("Mexico", Month::new(2, 2020), 0),
                Observation::new("Guatemala", Month::new(1, 2020), 5),
                Observation::new("Guatemala", Month::new(2, 2020), 0),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_unparseable_period_column_is_dropped() -> Result<(), IngestError> {
        let df = DataFrame::new(vec![
            Column::new("Nationality".into(), ["Honduras"]),
            Column::new("Oct-19".into(), ["7"]),
            Column::new("FY Total".into(), ["7"]),
        ])
        .unwrap();
        let rows = SchemaNormalizer::default().normalize("secondary", &df)?;
        assert_eq!(rows, vec![Observation::new("Honduras", Month::new(10, 2019), 7)]);
        Ok(())
    }

    #[test]
    fn test_numeric_columns_are_accepted() -> Result<(), IngestError> {
        let df = DataFrame::new(vec![
            Column::new("Nationality".into(), ["Peru"]),
            Column::new("March 2021".into(), [42i64]),
        ])
        .unwrap();
        let rows = SchemaNormalizer::default().normalize("numeric", &df)?;
        assert_eq!(rows, vec![Observation::new("Peru", Month::new(3, 2021), 42)]);
        Ok(())
    }

    #[test]
    fn test_sheet_without_periods_is_an_error() {
        let df = DataFrame::new(vec![
            Column::new("Nationality".into(), ["Peru"]),
            Column::new("Notes".into(), ["x"]),
        ])
        .unwrap();
        assert!(matches!(
            SchemaNormalizer::default().normalize("bad", &df),
            Err(IngestError::NoParseablePeriods { .. })
        ));
        let label_only = DataFrame::new(vec![Column::new("Nationality".into(), ["Peru"])]).unwrap();
        assert!(matches!(
            SchemaNormalizer::default().normalize("bad", &label_only),
            Err(IngestError::MissingPeriodColumns { .. })
        ));
    }

    #[test]
    fn test_title_case_and_parse_count() {
        assert_eq!(title_case("el salvador"), "El Salvador");
        assert_eq!(title_case("DOMINICAN REPUBLIC"), "Dominican Republic");
        assert_eq!(title_case("cote d'ivoire"), "Cote D'Ivoire");
        assert_eq!(parse_count(Some("1,234")), 1234);
        assert_eq!(parse_count(Some(" 12.0 ")), 12);
        assert_eq!(parse_count(Some("-")), 0);
        assert_eq!(parse_count(None), 0);
    }

    #[test]
    fn test_custom_exclusions() {
        let normalizer = SchemaNormalizer::with_exclusions(["stateless"]);
        assert_eq!(normalizer.clean_label("Stateless persons"), None);
        assert_eq!(normalizer.clean_label("unknown"), Some("Unknown".to_string()));
    }
}
