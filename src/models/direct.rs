//! Direct multi-horizon forecasting: one random forest per horizon, trained on
//! `encounters` shifted `h` months ahead within each nationality.

use crate::models::error::ModelError;
use crate::models::forest::{ForestParams, RandomForest};
use crate::models::matrix::{column_f64, design_matrix, drop_incomplete};
use crate::models::metrics::Metrics;
use crate::models::split::{chronological_split, SplitStrategy};
use crate::types::covariate::COUNTRY_CODE;
use crate::types::month::Month;
use crate::types::observation::{DATE, ENCOUNTERS, NATIONALITY, PERIOD};
use chrono::NaiveDate;
use log::{info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const TARGET: &str = "target";
pub const NATIONALITY_CODE: &str = "nationality_code";
pub const ACTUAL: &str = "actual";
pub const PREDICTED: &str = "predicted";
pub const FORECAST: &str = "forecast";
pub const TARGET_PERIOD: &str = "target_period";
pub const TARGET_DATE: &str = "target_date";

const EXCLUDED: [&str; 6] = [ENCOUNTERS, NATIONALITY, DATE, PERIOD, COUNTRY_CODE, TARGET];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectModel {
    pub horizon: usize,
    pub forest: RandomForest,
    /// Sorted nationality labels; a label's index is its `nationality_code`.
    pub nationalities: Vec<String>,
}

impl DirectModel {
    pub fn feature_columns(&self) -> &[String] {
        self.forest.feature_names()
    }
}

#[derive(Debug, Clone)]
pub struct DirectOutcome {
    pub model: DirectModel,
    pub metrics: Metrics,
    /// Held-out rows: `nationality`, `period`, `target_period`, `target_date`, `actual`, `predicted`.
    pub predictions: DataFrame,
    /// One row per nationality from its latest complete feature row:
    /// `nationality`, `period`, `target_period`, `target_date`, `forecast`.
    pub forecasts: DataFrame,
    /// Rows that had a target but were left out for missing feature values.
    pub incomplete_rows: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectForecaster {
    params: ForestParams,
    split: SplitStrategy,
}

impl DirectForecaster {
    pub fn new(params: ForestParams, split: SplitStrategy) -> Self {
        Self { params, split }
    }

    /// Trains and evaluates the model for one horizon (in months).
    pub fn fit_horizon(&self, features: &DataFrame, horizon: usize) -> Result<DirectOutcome, ModelError> {
        let (frame, nationalities) = with_nationality_code(features)?;
        let frame = with_target(frame, horizon)?;

        let feature_columns = numeric_feature_columns(&frame);
        let mut required = feature_columns.clone();
        required.push(TARGET.to_string());
        let complete = drop_incomplete(&frame, &required)?;
        let with_target = frame.clone().lazy().filter(col(TARGET).is_not_null()).collect()?;
        let incomplete_rows = report_incomplete_rows(&with_target, &feature_columns, complete.height(), horizon);
        if complete.height() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }

        let split = chronological_split(&complete, self.split)?;
        if split.train.height() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        let x_train = design_matrix(&split.train, &feature_columns)?;
        let y_train = column_f64(&split.train, TARGET)?;
        let forest = RandomForest::fit(&x_train, &y_train, feature_columns.clone(), self.params)?;

        let x_test = design_matrix(&split.test, &feature_columns)?;
        let actual = column_f64(&split.test, TARGET)?;
        let predicted = forest.predict(&x_test)?;
        let metrics = Metrics::evaluate(&actual, &predicted);
        info!(
            "Direct t+{} forest on {} features ({} train / {} test rows): {}",
            horizon,
            feature_columns.len(),
            split.train.height(),
            split.test.height(),
            metrics
        );

        let mut predictions = target_frame(&split.test, horizon)?;
        predictions.with_column(Column::new(ACTUAL.into(), actual))?;
        predictions.with_column(Column::new(PREDICTED.into(), predicted))?;

        let model = DirectModel {
            horizon,
            forest,
            nationalities,
        };
        let forecasts = next_period_forecasts(&model, &frame)?;
        Ok(DirectOutcome {
            model,
            metrics,
            predictions,
            forecasts,
            incomplete_rows,
        })
    }
}

/// Adds `target`: the nationality's encounters in month `period + horizon`, or null when
/// that month is not in the frame. Rows stay sorted by `(nationality, period)`.
fn with_target(frame: DataFrame, horizon: usize) -> PolarsResult<DataFrame> {
    let future = frame.clone().lazy().select([
        col(NATIONALITY),
        (col(PERIOD).cast(DataType::Int32) - lit(horizon as i32)).alias(PERIOD),
        col(ENCOUNTERS).cast(DataType::Float64).alias(TARGET),
    ]);
    frame
        .lazy()
        .with_column(col(PERIOD).cast(DataType::Int32))
        .join(
            future,
            [col(NATIONALITY), col(PERIOD)],
            [col(NATIONALITY), col(PERIOD)],
            JoinArgs::new(JoinType::Left),
        )
        .sort([NATIONALITY, PERIOD], Default::default())
        .collect()
}

/// Forecasts from each nationality's latest row whose features are all present.
pub fn next_period_forecasts(model: &DirectModel, frame: &DataFrame) -> Result<DataFrame, ModelError> {
    let complete = drop_incomplete(frame, model.feature_columns())?;
    let latest = complete
        .lazy()
        .filter(col(PERIOD).eq(col(PERIOD).max().over([col(NATIONALITY)])))
        .sort([NATIONALITY], Default::default())
        .collect()?;
    let x = design_matrix(&latest, model.feature_columns())?;
    let forecast = model.forest.predict(&x)?;
    let mut out = target_frame(&latest, model.horizon)?;
    out.with_column(Column::new(FORECAST.into(), forecast))?;
    Ok(out)
}

/// Sorts by `(nationality, period)` and adds `nationality_code`, the index of each label
/// in the sorted set of labels.
fn with_nationality_code(df: &DataFrame) -> Result<(DataFrame, Vec<String>), ModelError> {
    if df.column(NATIONALITY).is_err() {
        return Err(ModelError::MissingColumn(NATIONALITY.to_string()));
    }
    let mut frame = df
        .clone()
        .lazy()
        .sort([NATIONALITY, PERIOD], Default::default())
        .collect()?;

    let labels = frame.column(NATIONALITY)?.str()?;
    let nationalities: Vec<String> = labels
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let codes: Vec<Option<i32>> = labels
        .into_iter()
        .map(|l| {
            l.and_then(|l| nationalities.binary_search_by(|n| n.as_str().cmp(l)).ok())
                .map(|i| i as i32)
        })
        .collect();
    frame.with_column(Column::new(NATIONALITY_CODE.into(), codes))?;
    Ok((frame, nationalities))
}

/// Logs how many rows with a target were dropped for null features, naming the columns
/// with the most nulls. Returns the number dropped.
fn report_incomplete_rows(with_target: &DataFrame, features: &[String], kept: usize, horizon: usize) -> usize {
    let dropped = with_target.height().saturating_sub(kept);
    if dropped == 0 {
        return 0;
    }
    let mut nulls: Vec<(usize, &str)> = features
        .iter()
        .filter_map(|c| with_target.column(c).ok().map(|s| (s.null_count(), c.as_str())))
        .filter(|(n, _)| *n > 0)
        .collect();
    nulls.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(b.1)));
    let worst: Vec<String> = nulls
        .iter()
        .take(3)
        .map(|(n, c)| format!("{c} ({n} nulls)"))
        .collect();
    warn!(
        "t+{}: dropped {} of {} rows with a target for missing features; worst columns: {}",
        horizon,
        dropped,
        with_target.height(),
        worst.join(", ")
    );
    dropped
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Every numeric column except identifiers, the raw target and the shifted target.
fn numeric_feature_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| is_numeric(c.dtype()))
        .map(|c| c.name().to_string())
        .filter(|name| !EXCLUDED.contains(&name.as_str()))
        .collect()
}

fn target_frame(df: &DataFrame, horizon: usize) -> Result<DataFrame, ModelError> {
    let nationalities = df.column(NATIONALITY)?.clone();
    let periods: Vec<i32> = df
        .column(PERIOD)?
        .cast(&DataType::Int32)?
        .i32()?
        .into_iter()
        .flatten()
        .collect();
    let target_periods: Vec<i32> = periods.iter().map(|p| p + horizon as i32).collect();
    let target_dates: Vec<Option<NaiveDate>> = target_periods
        .iter()
        .map(|p| Month::from_period_index(*p).first_day())
        .collect();
    Ok(DataFrame::new(vec![
        nationalities,
        Column::new(PERIOD.into(), periods),
        Column::new(TARGET_PERIOD.into(), target_periods),
        Column::new(TARGET_DATE.into(), target_dates),
    ])?)
}
