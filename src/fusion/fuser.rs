//! Left-joins covariate tables onto the observation table.

use crate::frames::monthly_frame::FusedFrame;
use crate::fusion::error::FusionError;
use crate::ingest::normalizer::title_case;
use crate::sources::placeholders::crosswalk_frame;
use crate::types::covariate::{Aggregation, CovariateKind, CovariateTable, COUNTRY_CODE};
use crate::types::fill_policy::FillPlan;
use crate::types::observation::{ObservationTable, NATIONALITY, PERIOD};
use log::{info, warn};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};

const BASE_SOURCE: &str = "observations";
const CROSSWALK_SOURCE: &str = "crosswalk";

/// Joins covariates onto observations without adding rows, then applies the fill plan.
///
/// Every covariate table is first reduced to one row per key (see [`Aggregation`]), so a
/// left join can never duplicate an observation. Missing values are only filled once all
/// joins are done, which keeps "no data for this country" and "data that is zero" apart
/// until the final fill.
#[derive(Debug, Clone, Default)]
pub struct CovariateFuser {
    crosswalk: BTreeMap<String, String>,
    fill_plan: FillPlan,
}

impl CovariateFuser {
    /// # Arguments
    ///
    /// * `crosswalk` - Nationality to country code, used by [`CovariateKind::CountryMonthly`] tables.
    /// * `fill_plan` - Per-column null handling applied after every join.
    pub fn new(crosswalk: BTreeMap<String, String>, fill_plan: FillPlan) -> Self {
        let crosswalk = crosswalk
            .into_iter()
            .map(|(nationality, code)| (title_case(nationality.trim()), code))
            .collect();
        Self {
            crosswalk,
            fill_plan,
        }
    }

    /// Produces one row per observation with every covariate column attached.
    ///
    /// # Errors
    ///
    /// * [`FusionError::ColumnCollision`] if two sources (or a source and the base table)
    ///   would produce the same output column.
    /// * [`FusionError::MissingKeyColumn`] / [`FusionError::NoValueColumns`] for malformed tables.
    pub fn fuse(
        &self,
        observations: &ObservationTable,
        covariates: &[CovariateTable],
    ) -> Result<FusedFrame, FusionError> {
        let base = observations.to_frame()?;
        let needs_crosswalk = covariates
            .iter()
            .any(|c| c.kind == CovariateKind::CountryMonthly);
        self.check_columns(&base, covariates, needs_crosswalk)?;

        let mut fused = base.lazy();
        if needs_crosswalk {
            let crosswalk = crosswalk_frame(&self.crosswalk)?.lazy();
            fused = fused.join(
                crosswalk,
                [col(NATIONALITY)],
                [col(NATIONALITY)],
                JoinArgs::new(JoinType::Left),
            );
        }

        for table in covariates {
            if table.is_empty() {
                warn!(
                    "Covariate '{}' is empty; its columns will be null before filling",
                    table.name
                );
            }
            let keys: Vec<Expr> = table.kind.key_columns().iter().map(|k| col(*k)).collect();
            let values: Vec<Expr> = table
                .value_columns()
                .iter()
                .map(|c| {
                    let reduced = match table.aggregation {
                        Aggregation::First => col(c.as_str()).first(),
                        Aggregation::Sum => col(c.as_str()).sum(),
                    };
                    reduced.alias(table.output_column(c))
                })
                .collect();
            let reduced = normalized_labels(&table.frame)?
                .lazy()
                .group_by(keys.clone())
                .agg(values);
            fused = fused.join(reduced, keys.clone(), keys, JoinArgs::new(JoinType::Left));
            info!(
                "Joined {} covariate '{}' ({} rows)",
                table.kind,
                table.name,
                table.frame.height()
            );
        }

        let joined = fused.collect()?;
        let present = joined.get_column_names_str();
        let fills = self.fill_plan.expressions(&present);
        let frame = joined
            .lazy()
            .with_columns(fills)
            .sort([NATIONALITY, PERIOD], Default::default())
            .collect()?;

        if frame.height() != observations.len() {
            return Err(FusionError::RowCountChanged {
                expected: observations.len(),
                found: frame.height(),
            });
        }
        Ok(FusedFrame::new(frame))
    }

    fn check_columns(
        &self,
        base: &DataFrame,
        covariates: &[CovariateTable],
        needs_crosswalk: bool,
    ) -> Result<(), FusionError> {
        let mut owners: HashMap<String, String> = base
            .get_column_names()
            .into_iter()
            .map(|c| (c.to_string(), BASE_SOURCE.to_string()))
            .collect();
        if needs_crosswalk {
            owners.insert(COUNTRY_CODE.to_string(), CROSSWALK_SOURCE.to_string());
        }

        for table in covariates {
            for key in table.kind.key_columns() {
                if table.frame.column(key).is_err() {
                    return Err(FusionError::MissingKeyColumn {
                        source_name: table.name.clone(),
                        column: key.to_string(),
                    });
                }
            }
            let outputs = table.output_columns();
            if outputs.is_empty() {
                return Err(FusionError::NoValueColumns {
                    source_name: table.name.clone(),
                });
            }
            for column in outputs {
                if let Some(owner) = owners.get(&column) {
                    return Err(FusionError::ColumnCollision {
                        column,
                        source_name: table.name.clone(),
                        owner: owner.clone(),
                    });
                }
                owners.insert(column, table.name.clone());
            }
        }
        Ok(())
    }
}

/// Nationality keys get the same trim and title-case the observation labels got at ingest.
fn normalized_labels(frame: &DataFrame) -> PolarsResult<DataFrame> {
    let Ok(labels) = frame.column(NATIONALITY) else {
        return Ok(frame.clone());
    };
    let cleaned: StringChunked = labels
        .str()?
        .into_iter()
        .map(|label| label.map(|l| title_case(l.trim())))
        .collect();
    let mut frame = frame.clone();
    frame.with_column(cleaned.with_name(NATIONALITY.into()))?;
    Ok(frame)
}
