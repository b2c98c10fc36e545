use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What to do with nulls left in a column once every covariate has been joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Replace nulls with the mean of the non-null values, or 0 when there are none.
    Mean,
    /// Replace nulls with 0.
    Zero,
    #[default]
    LeaveNull,
}

/// Per-column fill policies, applied once after fusion.
///
/// Columns without an entry are left untouched.
///
/// # Examples
///
/// ```
/// use border_flows::{FillPlan, FillPolicy};
///
/// let plan = FillPlan::new()
///     .with("distance_km", FillPolicy::Mean)
///     .with("event_count", FillPolicy::Zero);
/// assert_eq!(plan.policy_for("distance_km"), FillPolicy::Mean);
/// assert_eq!(plan.policy_for("year"), FillPolicy::LeaveNull);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FillPlan {
    policies: BTreeMap<String, FillPolicy>,
}

impl FillPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, policy: FillPolicy) -> Self {
        self.policies.insert(column.into(), policy);
        self
    }

    pub fn policy_for(&self, column: &str) -> FillPolicy {
        self.policies.get(column).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FillPolicy)> {
        self.policies.iter().map(|(c, p)| (c.as_str(), *p))
    }

    /// Builds one replacement expression per planned column found in `present`.
    pub fn expressions<S: AsRef<str>>(&self, present: &[S]) -> Vec<Expr> {
        self.iter()
            .filter_map(|(column, policy)| {
                if !present.iter().any(|p| p.as_ref() == column) {
                    debug!("Fill plan names '{}' but the frame has no such column", column);
                    return None;
                }
                fill_expression(column, policy)
            })
            .collect()
    }
}

fn fill_expression(column: &str, policy: FillPolicy) -> Option<Expr> {
    match policy {
        FillPolicy::Mean => {
            let values = col(column).cast(DataType::Float64);
            Some(
                values
                    .clone()
                    .fill_null(values.mean())
                    .fill_null(lit(0.0))
                    .alias(column),
            )
        }
        FillPolicy::Zero => Some(
            col(column)
                .cast(DataType::Float64)
                .fill_null(lit(0.0))
                .alias(column),
        ),
        FillPolicy::LeaveNull => None,
    }
}
