use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Lag offsets (in rows of the same nationality, ordered by month) for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagSpec {
    pub column: String,
    pub lags: Vec<usize>,
}

impl LagSpec {
    pub fn new(column: impl Into<String>, lags: impl Into<Vec<usize>>) -> Self {
        Self {
            column: column.into(),
            lags: lags.into(),
        }
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.lags
            .iter()
            .map(|k| lag_column(&self.column, *k))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollingStat {
    Mean,
    Std,
}

impl Display for RollingStat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RollingStat::Mean => write!(f, "mean"),
            RollingStat::Std => write!(f, "std"),
        }
    }
}

/// Trailing windows (in months) for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingSpec {
    pub column: String,
    pub windows: Vec<usize>,
    pub stats: Vec<RollingStat>,
}

impl RollingSpec {
    pub fn new(column: impl Into<String>, windows: impl Into<Vec<usize>>) -> Self {
        Self {
            column: column.into(),
            windows: windows.into(),
            stats: vec![RollingStat::Mean, RollingStat::Std],
        }
    }

    pub fn with_stats(mut self, stats: impl Into<Vec<RollingStat>>) -> Self {
        self.stats = stats.into();
        self
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.windows
            .iter()
            .flat_map(|w| {
                self.stats
                    .iter()
                    .map(move |stat| rolling_column(&self.column, *stat, *w))
            })
            .collect()
    }
}

/// Which derived features to append to the fused table.
///
/// `lags` and `rolling` are computed inside each nationality's own history.
/// `global_lags` are for month-level covariates shared by all nationalities: they are
/// lagged on the one-row-per-month series and joined back by month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    #[serde(default)]
    pub lags: Vec<LagSpec>,
    #[serde(default)]
    pub rolling: Vec<RollingSpec>,
    #[serde(default)]
    pub global_lags: Vec<LagSpec>,
}

impl FeatureSpec {
    pub fn empty() -> Self {
        Self {
            lags: vec![],
            rolling: vec![],
            global_lags: vec![],
        }
    }

    pub fn with_lags(mut self, spec: LagSpec) -> Self {
        self.lags.push(spec);
        self
    }

    pub fn with_rolling(mut self, spec: RollingSpec) -> Self {
        self.rolling.push(spec);
        self
    }

    pub fn with_global_lags(mut self, spec: LagSpec) -> Self {
        self.global_lags.push(spec);
        self
    }

    /// Every column name the deriver may append, in derivation order.
    pub fn output_columns(&self) -> Vec<String> {
        self.lags
            .iter()
            .flat_map(LagSpec::output_columns)
            .chain(self.rolling.iter().flat_map(RollingSpec::output_columns))
            .chain(self.global_lags.iter().flat_map(LagSpec::output_columns))
            .collect()
    }
}

impl Default for FeatureSpec {
    fn default() -> Self {
        FeatureSpec::empty()
            .with_lags(LagSpec::new("encounters", [1, 2, 3, 6, 12]))
            .with_lags(LagSpec::new("event_count", [1, 2, 3]))
            .with_rolling(RollingSpec::new("encounters", [3, 6, 12]))
            .with_global_lags(LagSpec::new("us_hospitality_job_openings", [1, 2, 3]))
            .with_global_lags(LagSpec::new("us_construction_job_openings", [1, 2, 3]))
    }
}

pub fn lag_column(column: &str, lag: usize) -> String {
    format!("{column}_lag_{lag}")
}

pub fn rolling_column(column: &str, stat: RollingStat, window: usize) -> String {
    format!("{column}_roll_{stat}_{window}m")
}
