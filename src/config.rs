//! Run configuration, loadable from JSON.

use crate::geo::DISTANCE_KM;
use crate::models::forest::ForestParams;
use crate::models::hybrid::HybridSpec;
use crate::models::split::SplitStrategy;
use crate::sources::gdelt::{CONFLICT_ROOT_CODES, DEFAULT_BASE_URL, EVENT_COUNT};
use crate::sources::open_meteo::{ARCHIVE_URL, ATMOSPHERIC_VARIABLES, MARINE_URL, MARINE_VARIABLES};
use crate::types::feature_spec::FeatureSpec;
use crate::types::fill_policy::{FillPlan, FillPolicy};
use crate::types::month::Month;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PRIMARY_SHEET_URL: &str =
    "https://docs.google.com/spreadsheets/d/1QIVCWAZgYVuDx0aaD1ib4BhethPP5s5gymxreb5KVHk/export?format=csv";
pub const SECONDARY_SHEET_URL: &str =
    "https://docs.google.com/spreadsheets/d/1n0-Lb2ZewwBxXFSuNjYpgElZbyBnXARIB0cZF6VvNac/export?format=csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{0}'")]
    Parse(PathBuf, #[source] serde_json::Error),
}

/// Where a spreadsheet comes from and how its download is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetSource {
    pub url: String,
    pub cache_name: String,
}

impl SheetSource {
    pub fn new(url: impl Into<String>, cache_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache_name: cache_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GdeltConfig {
    pub base_url: String,
    pub root_codes: Vec<String>,
    pub days: Vec<NaiveDate>,
}

impl Default for GdeltConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            root_codes: CONFLICT_ROOT_CODES.iter().map(|c| c.to_string()).collect(),
            days: NaiveDate::from_ymd_opt(2023, 1, 1).into_iter().collect(),
        }
    }
}

/// A grid point whose weather is fetched. `name` prefixes every column it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSite {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Open-Meteo request settings. An empty `sites` list turns the source off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub archive_url: String,
    pub marine_url: String,
    pub sites: Vec<EnvironmentSite>,
    pub start: NaiveDate,
    /// Defaults to the last day of the previous month.
    pub end: Option<NaiveDate>,
    pub atmospheric: Vec<String>,
    pub marine: Vec<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            archive_url: ARCHIVE_URL.to_string(),
            marine_url: MARINE_URL.to_string(),
            sites: vec![EnvironmentSite {
                name: "rio_grande".to_string(),
                latitude: 25.95,
                longitude: -97.15,
            }],
            start: NaiveDate::from_ymd_opt(2013, 1, 1).unwrap_or_default(),
            end: None,
            atmospheric: ATMOSPHERIC_VARIABLES.iter().map(|v| v.to_string()).collect(),
            marine: MARINE_VARIABLES.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Everything a [`crate::MigrationPipeline`] run needs besides the cache location.
///
/// Every field has a default, so a JSON file only has to name what it overrides.
///
/// # Examples
///
/// ```
/// use border_flows::PipelineConfig;
///
/// let config: PipelineConfig = serde_json::from_str(r#"{ "horizons": [1, 6] }"#).unwrap();
/// assert_eq!(config.horizons, vec![1, 6]);
/// assert_eq!(config.forest.n_estimators, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Recent table; wins on duplicate `(nationality, month)` keys.
    pub primary_sheet: SheetSource,
    pub secondary_sheet: SheetSource,
    /// Primary rows from this month onwards are dropped.
    pub primary_cutoff: Option<Month>,
    pub gdelt: GdeltConfig,
    pub environment: EnvironmentConfig,
    pub island_exceptions: Vec<String>,
    pub features: FeatureSpec,
    pub fill: FillPlan,
    pub forest: ForestParams,
    pub hybrid: HybridSpec,
    pub horizons: Vec<usize>,
    pub split: SplitStrategy,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary_sheet: SheetSource::new(PRIMARY_SHEET_URL, "migration_2019_present.csv"),
            secondary_sheet: SheetSource::new(SECONDARY_SHEET_URL, "migration_2013_present.csv"),
            primary_cutoff: Some(Month::new(7, 2024)),
            gdelt: GdeltConfig::default(),
            environment: EnvironmentConfig::default(),
            island_exceptions: vec![],
            features: FeatureSpec::default(),
            fill: FillPlan::new()
                .with(DISTANCE_KM, FillPolicy::Mean)
                .with(EVENT_COUNT, FillPolicy::Zero),
            forest: ForestParams::default(),
            hybrid: HybridSpec::default(),
            horizons: vec![1, 3],
            split: SplitStrategy::default(),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }
}
