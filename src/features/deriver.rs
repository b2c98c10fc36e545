//! Calendar, lag and rolling-window features on top of a fused frame.

use crate::features::error::FeatureError;
use crate::frames::monthly_frame::{FeatureFrame, FusedFrame};
use crate::types::feature_spec::{lag_column, rolling_column, FeatureSpec, LagSpec, RollingStat};
use crate::types::month::Month;
use crate::types::observation::{NATIONALITY, PERIOD};
use log::{debug, info};
use polars::prelude::*;

pub const YEAR: &str = "year";
pub const MONTH: &str = "month";
pub const QUARTER: &str = "quarter";
pub const TIME_INDEX: &str = "time_index";

/// Appends derived columns to a fused frame according to a [`FeatureSpec`].
///
/// Grouped features (`lags`, `rolling`) only ever look at earlier rows of the same
/// nationality. Global lags are computed on the one-row-per-month series of a covariate
/// and joined back by month, so every nationality sees the same lagged value.
#[derive(Debug, Clone, Default)]
pub struct FeatureDeriver {
    spec: FeatureSpec,
}

impl FeatureDeriver {
    pub fn new(spec: FeatureSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    pub fn derive(&self, fused: &FusedFrame) -> Result<FeatureFrame, FeatureError> {
        let frame = &fused.frame;
        for key in [NATIONALITY, PERIOD] {
            if frame.column(key).is_err() {
                return Err(FeatureError::MissingKeyColumn(key.to_string()));
            }
        }
        if frame.height() == 0 {
            return Err(FeatureError::Empty);
        }

        let mut frame = frame
            .clone()
            .lazy()
            .sort([NATIONALITY, PERIOD], Default::default())
            .collect()?;
        let mut produced = add_calendar_columns(&mut frame)?;

        let mut grouped = Vec::new();
        for spec in &self.spec.lags {
            if !is_usable(&frame, &spec.column)? {
                continue;
            }
            for &lag in &spec.lags {
                let name = lag_column(&spec.column, lag);
                grouped.push(
                    col(spec.column.as_str())
                        .cast(DataType::Float64)
                        .shift(lit(lag as i64))
                        .over([col(NATIONALITY)])
                        .alias(name.as_str()),
                );
                produced.push(name);
            }
        }
        for spec in &self.spec.rolling {
            if !is_usable(&frame, &spec.column)? {
                continue;
            }
            for &window in &spec.windows {
                for &stat in &spec.stats {
                    let name = rolling_column(&spec.column, stat, window);
                    grouped.push(rolling_expr(&spec.column, stat, window).alias(name.as_str()));
                    produced.push(name);
                }
            }
        }

        let mut lazy = frame.lazy().with_columns(grouped);
        let mut global_frame = None;
        for spec in &self.spec.global_lags {
            let current = match global_frame.take() {
                Some(df) => df,
                None => lazy.clone().collect()?,
            };
            if !is_usable(&current, &spec.column)? {
                global_frame = Some(current);
                continue;
            }
            let lagged = global_lag_table(&current, spec)?;
            produced.extend(spec.output_columns());
            let joined = current
                .lazy()
                .join(
                    lagged.lazy(),
                    [col(PERIOD)],
                    [col(PERIOD)],
                    JoinArgs::new(JoinType::Left),
                )
                .sort([NATIONALITY, PERIOD], Default::default())
                .collect()?;
            global_frame = Some(joined);
        }
        if let Some(df) = global_frame {
            lazy = df.lazy();
        }

        let frame = lazy.collect()?;
        info!(
            "Derived {} feature columns over {} rows",
            produced.len(),
            frame.height()
        );
        Ok(FeatureFrame::new(frame, produced))
    }
}

fn add_calendar_columns(frame: &mut DataFrame) -> Result<Vec<String>, FeatureError> {
    let periods = frame.column(PERIOD)?.cast(&DataType::Int32)?;
    let periods = periods.i32()?;
    let first = periods.min().ok_or(FeatureError::Empty)?;

    let months: Vec<Option<Month>> = periods
        .into_iter()
        .map(|p| p.map(Month::from_period_index))
        .collect();
    let years: Vec<Option<i32>> = months.iter().map(|m| m.map(Month::year)).collect();
    let month_numbers: Vec<Option<i32>> = months
        .iter()
        .map(|m| m.map(|m| m.month() as i32))
        .collect();
    let quarters: Vec<Option<i32>> = months
        .iter()
        .map(|m| m.map(|m| m.quarter() as i32))
        .collect();
    let elapsed: Vec<Option<i32>> = periods.into_iter().map(|p| p.map(|p| p - first)).collect();

    frame.with_column(Column::new(YEAR.into(), years))?;
    frame.with_column(Column::new(MONTH.into(), month_numbers))?;
    frame.with_column(Column::new(QUARTER.into(), quarters))?;
    frame.with_column(Column::new(TIME_INDEX.into(), elapsed))?;
    Ok(vec![
        YEAR.to_string(),
        MONTH.to_string(),
        QUARTER.to_string(),
        TIME_INDEX.to_string(),
    ])
}

fn rolling_expr(column: &str, stat: RollingStat, window: usize) -> Expr {
    let options = RollingOptionsFixedWindow {
        window_size: window,
        min_periods: 1,
        ..Default::default()
    };
    let values = col(column).cast(DataType::Float64);
    match stat {
        RollingStat::Mean => values.rolling_mean(options).over([col(NATIONALITY)]),
        // The sample std of a single point is undefined; report it as no spread.
        RollingStat::Std => values
            .rolling_std(options)
            .over([col(NATIONALITY)])
            .fill_nan(lit(0.0))
            .fill_null(lit(0.0)),
    }
}

/// Lags `spec.column` on its per-month series: one value per period, sorted by period.
fn global_lag_table(frame: &DataFrame, spec: &LagSpec) -> PolarsResult<DataFrame> {
    let lags: Vec<Expr> = spec
        .lags
        .iter()
        .map(|&lag| {
            col(spec.column.as_str())
                .shift(lit(lag as i64))
                .alias(lag_column(&spec.column, lag))
        })
        .collect();
    frame
        .clone()
        .lazy()
        .group_by([col(PERIOD)])
        .agg([col(spec.column.as_str())
            .cast(DataType::Float64)
            .drop_nulls()
            .first()])
        .sort([PERIOD], Default::default())
        .with_columns(lags)
        .drop([spec.column.as_str()])
        .collect()
}

/// A column can feed features only if it exists, has a value, and is not all zeros.
fn is_usable(frame: &DataFrame, column: &str) -> Result<bool, FeatureError> {
    let Ok(values) = frame.column(column) else {
        info!("Skipping features for '{}': column not present", column);
        return Ok(false);
    };
    if values.null_count() == values.len() {
        info!("Skipping features for '{}': column is entirely null", column);
        return Ok(false);
    }
    let values = values.cast(&DataType::Float64)?;
    let total = values.f64()?.sum().unwrap_or(0.0);
    if total == 0.0 {
        info!("Skipping features for '{}': column sums to zero", column);
        return Ok(false);
    }
    debug!("Deriving features for '{}'", column);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::monthly_frame::MonthlyFrame;
    use crate::types::feature_spec::RollingSpec;
    use crate::types::observation::ENCOUNTERS;

    const JOBS: &str = "jobs";

    fn frame(nationalities: &[&str], periods: &[i32], encounters: &[i64]) -> FusedFrame {
        FusedFrame::new(
            DataFrame::new(vec![
                Column::new(NATIONALITY.into(), nationalities),
                Column::new(PERIOD.into(), periods),
                Column::new(ENCOUNTERS.into(), encounters),
            ])
            .unwrap(),
        )
    }

    fn floats(df: &DataFrame, column: &str) -> Vec<Option<f64>> {
        df.column(column).unwrap().f64().unwrap().into_iter().collect()
    }

    fn start() -> i32 {
        Month::new(1, 2023).period_index()
    }

    #[test]
    fn test_lag_within_single_nationality() -> Result<(), Box<dyn std::error::Error>> {
        let s = start();
        let fused = frame(&["Mexico"; 5], &[s, s + 1, s + 2, s + 3, s + 4], &[10, 20, 30, 40, 50]);
        let spec = FeatureSpec::empty().with_lags(LagSpec::new(ENCOUNTERS, [1]));
        let features = FeatureDeriver::new(spec).derive(&fused)?;
        assert_eq!(
            floats(&features.frame, "encounters_lag_1"),
            vec![None, Some(10.0), Some(20.0), Some(30.0), Some(40.0)]
        );
        Ok(())
    }

    #[test]
    fn test_lag_never_crosses_nationalities() -> Result<(), Box<dyn std::error::Error>> {
        let s = start();
        let fused = frame(
            &["Mexico", "Peru", "Mexico", "Peru", "Mexico", "Peru"],
            &[s, s, s + 1, s + 1, s + 2, s + 2],
            &[10, 1, 20, 2, 30, 3],
        );
        let spec = FeatureSpec::empty().with_lags(LagSpec::new(ENCOUNTERS, [1]));
        let features = FeatureDeriver::new(spec).derive(&fused)?;

        let mexico = features.for_nationality("Mexico").collect()?;
        assert_eq!(
            floats(&mexico, "encounters_lag_1"),
            vec![None, Some(10.0), Some(20.0)]
        );
        let peru = features.for_nationality("Peru").collect()?;
        assert_eq!(
            floats(&peru, "encounters_lag_1"),
            vec![None, Some(1.0), Some(2.0)]
        );
        Ok(())
    }

    #[test]
    fn test_rolling_mean_and_std_with_min_periods() -> Result<(), Box<dyn std::error::Error>> {
        let s = start();
        let fused = frame(&["Mexico"; 5], &[s, s + 1, s + 2, s + 3, s + 4], &[10, 20, 30, 40, 50]);
        let spec = FeatureSpec::empty().with_rolling(RollingSpec::new(ENCOUNTERS, [3]));
        let features = FeatureDeriver::new(spec).derive(&fused)?;

        assert_eq!(
            floats(&features.frame, "encounters_roll_mean_3m"),
            vec![Some(10.0), Some(15.0), Some(20.0), Some(30.0), Some(40.0)]
        );
        let std = floats(&features.frame, "encounters_roll_std_3m");
        assert_eq!(std[0], Some(0.0));
        assert!((std[1].unwrap() - 7.0710678).abs() < 1e-6);
        assert!((std[4].unwrap() - 10.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_calendar_columns() -> Result<(), Box<dyn std::error::Error>> {
        let nov = Month::new(11, 2022).period_index();
        let fused = frame(&["Mexico", "Mexico", "Peru"], &[nov, nov + 5, nov + 2], &[1, 2, 3]);
        let features = FeatureDeriver::new(FeatureSpec::empty()).derive(&fused)?;
        let df = &features.frame;

        let years: Vec<Option<i32>> = df.column(YEAR)?.i32()?.into_iter().collect();
        let months: Vec<Option<i32>> = df.column(MONTH)?.i32()?.into_iter().collect();
        let quarters: Vec<Option<i32>> = df.column(QUARTER)?.i32()?.into_iter().collect();
        let elapsed: Vec<Option<i32>> = df.column(TIME_INDEX)?.i32()?.into_iter().collect();
        assert_eq!(years, vec![Some(2022), Some(2023), Some(2023)]);
        assert_eq!(months, vec![Some(11), Some(4), Some(1)]);
        assert_eq!(quarters, vec![Some(4), Some(2), Some(1)]);
        assert_eq!(elapsed, vec![Some(0), Some(5), Some(2)]);
        assert_eq!(features.feature_columns, vec![YEAR, MONTH, QUARTER, TIME_INDEX]);
        Ok(())
    }

    fn with_jobs(fused: FusedFrame) -> FusedFrame {
        let mut df = fused.frame;
        let jobs: Vec<f64> = df
            .column(PERIOD)
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .map(|p| f64::from(p.unwrap_or(0) - start() + 1) * 100.0)
            .collect();
        df.with_column(Column::new(JOBS.into(), jobs)).unwrap();
        FusedFrame::new(df)
    }

    #[test]
    fn test_global_lag_matches_per_month_series() -> Result<(), Box<dyn std::error::Error>> {
        let s = start();
        // Peru joins one month late, so the two histories are ragged.
        let fused = with_jobs(frame(
            &["Mexico", "Mexico", "Mexico", "Peru", "Peru"],
            &[s, s + 1, s + 2, s + 1, s + 2],
            &[1, 2, 3, 4, 5],
        ));
        let spec = FeatureSpec::empty().with_global_lags(LagSpec::new(JOBS, [1]));
        let features = FeatureDeriver::new(spec).derive(&fused)?;

        for nationality in ["Mexico", "Peru"] {
            let rows = features
                .for_nationality(nationality)
                .filter(col(PERIOD).eq(lit(s + 2)))
                .collect()?;
            assert_eq!(floats(&rows, "jobs_lag_1"), vec![Some(200.0)]);
        }
        let first_peru = features.for_nationality("Peru").collect()?;
        assert_eq!(floats(&first_peru, "jobs_lag_1")[0], Some(100.0));

        // Shifting after broadcasting hands one nationality the same month's value.
        let naive = fused
            .frame
            .clone()
            .lazy()
            .sort([PERIOD, NATIONALITY], Default::default())
            .with_column(col(JOBS).shift(lit(1i64)).alias("naive_lag_1"))
            .sort([NATIONALITY, PERIOD], Default::default())
            .collect()?;
        assert_ne!(
            floats(&naive, "naive_lag_1"),
            floats(&features.frame, "jobs_lag_1")
        );
        Ok(())
    }

    #[test]
    fn test_unusable_columns_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let s = start();
        let mut fused = frame(&["Mexico"; 3], &[s, s + 1, s + 2], &[1, 2, 3]);
        fused
            .frame
            .with_column(Column::new("event_count".into(), [0.0f64, 0.0, 0.0]))?;
        let spec = FeatureSpec::empty()
            .with_lags(LagSpec::new("event_count", [1]))
            .with_lags(LagSpec::new("missing", [1]))
            .with_global_lags(LagSpec::new("also_missing", [1]));
        let features = FeatureDeriver::new(spec).derive(&fused)?;
        assert!(features.frame.column("event_count_lag_1").is_err());
        assert!(features.frame.column("missing_lag_1").is_err());
        assert_eq!(features.feature_columns.len(), 4);
        Ok(())
    }

    #[test]
    fn test_empty_frame_is_an_error() {
        let fused = frame(&[], &[], &[]);
        assert!(matches!(
            FeatureDeriver::default().derive(&fused),
            Err(FeatureError::Empty)
        ));
    }
}
