use crate::models::error::ModelError;
use crate::types::observation::PERIOD;
use log::{info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimum share of rows a date-based split must leave in the test set.
const MIN_TEST_SHARE: f64 = 0.1;

/// How the held-out tail is chosen. Rows are never shuffled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// The last `n` distinct months are held out.
    LastPeriods(usize),
    /// The last fraction of distinct months is held out. When that leaves less than 10% of
    /// rows in test, the last fraction of the month-sorted rows is used instead.
    Fraction(f64),
}

impl Default for SplitStrategy {
    fn default() -> Self {
        SplitStrategy::Fraction(0.2)
    }
}

#[derive(Debug, Clone)]
pub struct TrainTest {
    pub train: DataFrame,
    pub test: DataFrame,
}

/// Splits `df` on its `period` column so that every test row is no earlier than every train row.
///
/// # Errors
///
/// [`ModelError::InsufficientDates`] when fewer than two distinct months are present.
pub fn chronological_split(df: &DataFrame, strategy: SplitStrategy) -> Result<TrainTest, ModelError> {
    let sorted = df
        .clone()
        .lazy()
        .sort([PERIOD], SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;
    let periods: BTreeSet<i32> = sorted
        .column(PERIOD)
        .map_err(|_| ModelError::MissingColumn(PERIOD.to_string()))?
        .cast(&DataType::Int32)?
        .i32()?
        .into_iter()
        .flatten()
        .collect();
    let periods: Vec<i32> = periods.into_iter().collect();
    if periods.len() < 2 {
        return Err(ModelError::InsufficientDates {
            found: periods.len(),
        });
    }

    let held_out = match strategy {
        SplitStrategy::LastPeriods(n) => n,
        SplitStrategy::Fraction(f) => {
            let train_dates = (periods.len() as f64 * (1.0 - f.clamp(0.0, 1.0))).floor() as usize;
            periods.len() - train_dates
        }
    };
    let held_out = held_out.clamp(1, periods.len() - 1);
    let cutoff = periods[periods.len() - held_out];

    let train = sorted
        .clone()
        .lazy()
        .filter(col(PERIOD).lt(lit(cutoff)))
        .collect()?;
    let test = sorted
        .clone()
        .lazy()
        .filter(col(PERIOD).gt_eq(lit(cutoff)))
        .collect()?;

    if let SplitStrategy::Fraction(f) = strategy {
        if (test.height() as f64) < MIN_TEST_SHARE * sorted.height() as f64 {
            warn!(
                "Date split left only {} of {} rows in test; falling back to a row split",
                test.height(),
                sorted.height()
            );
            let train_rows = (sorted.height() as f64 * (1.0 - f.clamp(0.0, 1.0))).floor() as usize;
            let train_rows = train_rows.min(sorted.height());
            return Ok(TrainTest {
                train: sorted.slice(0, train_rows),
                test: sorted.slice(train_rows as i64, sorted.height() - train_rows),
            });
        }
    }

    info!(
        "Split {} rows into {} train / {} test at period {}",
        sorted.height(),
        train.height(),
        test.height(),
        cutoff
    );
    Ok(TrainTest { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::observation::NATIONALITY;

    fn frame(periods: &[i32]) -> DataFrame {
        let names: Vec<String> = (0..periods.len()).map(|i| format!("n{}", i % 2)).collect();
        DataFrame::new(vec![
            Column::new(NATIONALITY.into(), names),
            Column::new(PERIOD.into(), periods),
        ])
        .unwrap()
    }

    fn max_period(df: &DataFrame) -> Option<i32> {
        df.column(PERIOD).unwrap().i32().unwrap().max()
    }

    fn min_period(df: &DataFrame) -> Option<i32> {
        df.column(PERIOD).unwrap().i32().unwrap().min()
    }

    #[test]
    fn test_fraction_splits_on_dates() -> Result<(), Box<dyn std::error::Error>> {
        let periods: Vec<i32> = (0..10).flat_map(|p| [p, p]).collect();
        let split = chronological_split(&frame(&periods), SplitStrategy::Fraction(0.2))?;
        assert_eq!(split.train.height(), 16);
        assert_eq!(split.test.height(), 4);
        assert!(max_period(&split.train) < min_period(&split.test));
        Ok(())
    }

    #[test]
    fn test_last_periods() -> Result<(), Box<dyn std::error::Error>> {
        let periods: Vec<i32> = (0..6).rev().collect();
        let split = chronological_split(&frame(&periods), SplitStrategy::LastPeriods(2))?;
        assert_eq!(min_period(&split.test), Some(4));
        assert_eq!(split.train.height(), 4);
        Ok(())
    }

    #[test]
    fn test_small_test_share_falls_back_to_rows() -> Result<(), Box<dyn std::error::Error>> {
        // The final month holds a single row out of 30.
        let mut periods = vec![0; 29];
        periods.push(1);
        let split = chronological_split(&frame(&periods), SplitStrategy::Fraction(0.2))?;
        assert_eq!(split.train.height(), 24);
        assert_eq!(split.test.height(), 6);
        assert_eq!(max_period(&split.test), Some(1));
        Ok(())
    }

    #[test]
    fn test_single_date_is_rejected() {
        assert!(matches!(
            chronological_split(&frame(&[3, 3, 3]), SplitStrategy::default()),
            Err(ModelError::InsufficientDates { found: 1 })
        ));
    }
}
