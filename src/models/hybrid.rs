//! SARIMAX on total monthly encounters, with a random forest fitted to its residuals.

use crate::features::deriver::{MONTH, TIME_INDEX};
use crate::models::error::ModelError;
use crate::models::forest::{ForestParams, RandomForest};
use crate::models::grid::{search, SarimaGrid};
use crate::models::matrix::{column_f64, design_matrix};
use crate::models::metrics::Metrics;
use crate::models::sarimax::Sarimax;
use crate::models::split::{chronological_split, SplitStrategy};
use crate::sources::gdelt::EVENT_COUNT;
use crate::sources::placeholders::{US_CONSTRUCTION_JOB_OPENINGS, US_HOSPITALITY_JOB_OPENINGS};
use crate::types::month::Month;
use crate::types::observation::{DATE, ENCOUNTERS, PERIOD};
use chrono::NaiveDate;
use log::{info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

pub const ACTUAL: &str = "actual";
pub const PREDICTED: &str = "predicted";
pub const SARIMAX_COMPONENT: &str = "sarimax";
pub const RESIDUAL_COMPONENT: &str = "residual_correction";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridSpec {
    /// Month-level covariates; one value per month is taken.
    pub shared_exog: Vec<String>,
    /// Per-nationality covariates; summed over nationalities per month.
    pub summed_exog: Vec<String>,
    pub grid: SarimaGrid,
    pub forest: ForestParams,
    pub split: SplitStrategy,
}

impl Default for HybridSpec {
    fn default() -> Self {
        Self {
            shared_exog: vec![
                US_HOSPITALITY_JOB_OPENINGS.to_string(),
                US_CONSTRUCTION_JOB_OPENINGS.to_string(),
            ],
            summed_exog: vec![EVENT_COUNT.to_string()],
            grid: SarimaGrid::default(),
            forest: ForestParams::default(),
            split: SplitStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridModel {
    pub sarimax: Sarimax,
    /// Absent when no training month had a defined SARIMAX residual.
    pub residual_forest: Option<RandomForest>,
    pub exog_columns: Vec<String>,
    pub first_period: i32,
}

impl HybridModel {
    fn residual_features(&self, periods: &[i32], exog: &[Vec<f64>]) -> Vec<Vec<f64>> {
        residual_features(periods, exog, self.first_period)
    }
}

#[derive(Debug, Clone)]
pub struct HybridOutcome {
    pub model: HybridModel,
    pub metrics: Metrics,
    /// One row per held-out month: `period`, `date`, `actual`, `sarimax`,
    /// `residual_correction`, `predicted`.
    pub predictions: DataFrame,
}

/// Sums encounters per month and attaches the usable exogenous columns.
///
/// Exogenous columns that are entirely null or constant are dropped; remaining nulls are
/// replaced with the column mean. Returns the monthly frame and the kept column names.
pub fn monthly_totals(frame: &DataFrame, spec: &HybridSpec) -> Result<(DataFrame, Vec<String>), ModelError> {
    let present = |c: &str| frame.column(c).is_ok();
    let mut aggregations = vec![col(ENCOUNTERS).cast(DataType::Float64).sum()];
    aggregations.extend(spec.shared_exog.iter().filter(|c| present(c.as_str())).map(|c| {
        col(c.as_str())
            .cast(DataType::Float64)
            .drop_nulls()
            .first()
    }));
    aggregations.extend(
        spec.summed_exog
            .iter()
            .filter(|c| present(c.as_str()))
            .map(|c| col(c.as_str()).cast(DataType::Float64).sum()),
    );

    let mut totals = frame
        .clone()
        .lazy()
        .group_by([col(PERIOD)])
        .agg(aggregations)
        .sort([PERIOD], Default::default())
        .collect()?;

    let mut kept = Vec::new();
    for name in spec.shared_exog.iter().chain(&spec.summed_exog) {
        if totals.column(name).is_err() {
            continue;
        }
        let values: Vec<Option<f64>> = totals
            .column(name)?
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .collect();
        let known: Vec<f64> = values.iter().flatten().copied().collect();
        if known.is_empty() {
            info!("Dropping exogenous '{}': no values", name);
            totals.drop_in_place(name)?;
            continue;
        }
        let mean = known.iter().sum::<f64>() / known.len() as f64;
        let filled: Vec<f64> = values.iter().map(|v| v.unwrap_or(mean)).collect();
        if filled.iter().all(|v| (v - filled[0]).abs() < f64::EPSILON) {
            info!("Dropping exogenous '{}': constant", name);
            totals.drop_in_place(name)?;
            continue;
        }
        totals.with_column(Column::new(name.as_str().into(), filled))?;
        kept.push(name.clone());
    }
    Ok((totals, kept))
}

/// Fits and evaluates the hybrid model on a feature frame.
pub fn fit_hybrid(frame: &DataFrame, spec: &HybridSpec) -> Result<HybridOutcome, ModelError> {
    let (totals, exog_columns) = monthly_totals(frame, spec)?;
    let split = chronological_split(&totals, spec.split)?;

    let train_y = column_f64(&split.train, ENCOUNTERS)?;
    let train_exog = exog_rows(&split.train, &exog_columns)?;
    let train_periods = periods(&split.train)?;
    let first_period = train_periods.first().copied().unwrap_or_default();

    let grid = search(&train_y, &train_exog, &spec.grid)?;
    let sarimax = grid.best;

    let residuals = sarimax.residuals();
    let residual_rows: Vec<usize> = residuals
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.map(|_| i))
        .collect();
    let residual_forest = if residual_rows.is_empty() {
        warn!("SARIMAX left no in-sample residuals; skipping the residual forest");
        None
    } else {
        let features = residual_features(&train_periods, &train_exog, first_period);
        let x: Vec<Vec<f64>> = residual_rows.iter().map(|&i| features[i].clone()).collect();
        let y: Vec<f64> = residual_rows
            .iter()
            .map(|&i| residuals[i].unwrap_or_default())
            .collect();
        Some(RandomForest::fit(
            &x,
            &y,
            residual_feature_names(&exog_columns),
            spec.forest,
        )?)
    };

    let model = HybridModel {
        sarimax,
        residual_forest,
        exog_columns,
        first_period,
    };

    let test_periods = periods(&split.test)?;
    let test_exog = exog_rows(&split.test, &model.exog_columns)?;
    let actual = column_f64(&split.test, ENCOUNTERS)?;
    let base = model.sarimax.forecast(test_periods.len(), &test_exog)?;
    let correction = match &model.residual_forest {
        Some(forest) => forest.predict(&model.residual_features(&test_periods, &test_exog))?,
        None => vec![0.0; base.len()],
    };
    let predicted: Vec<f64> = base.iter().zip(&correction).map(|(b, c)| b + c).collect();
    let metrics = Metrics::evaluate(&actual, &predicted);
    info!("Hybrid SARIMAX{} + RF: {}", model.sarimax.order(), metrics);

    let dates: Vec<Option<NaiveDate>> = test_periods
        .iter()
        .map(|p| Month::from_period_index(*p).first_day())
        .collect();
    let predictions = DataFrame::new(vec![
        Column::new(PERIOD.into(), test_periods),
        Column::new(DATE.into(), dates),
        Column::new(ACTUAL.into(), actual),
        Column::new(SARIMAX_COMPONENT.into(), base),
        Column::new(RESIDUAL_COMPONENT.into(), correction),
        Column::new(PREDICTED.into(), predicted),
    ])?;

    Ok(HybridOutcome {
        model,
        metrics,
        predictions,
    })
}

fn periods(df: &DataFrame) -> Result<Vec<i32>, ModelError> {
    Ok(df
        .column(PERIOD)?
        .cast(&DataType::Int32)?
        .i32()?
        .into_iter()
        .flatten()
        .collect())
}

fn exog_rows(df: &DataFrame, columns: &[String]) -> Result<Vec<Vec<f64>>, ModelError> {
    if columns.is_empty() {
        return Ok(vec![]);
    }
    design_matrix(df, columns)
}

fn residual_feature_names(exog_columns: &[String]) -> Vec<String> {
    let mut names = vec![MONTH.to_string(), TIME_INDEX.to_string()];
    names.extend(exog_columns.iter().cloned());
    names
}

fn residual_features(periods: &[i32], exog: &[Vec<f64>], first_period: i32) -> Vec<Vec<f64>> {
    periods
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut row = vec![
                f64::from(Month::from_period_index(*p).month()),
                f64::from(p - first_period),
            ];
            if let Some(values) = exog.get(i) {
                row.extend_from_slice(values);
            }
            row
        })
        .collect()
}
