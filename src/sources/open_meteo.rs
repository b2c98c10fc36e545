//! Monthly weather and sea-state covariates from the Open-Meteo archive and marine APIs.
//!
//! Both APIs return hourly series for one grid cell. Hours are averaged per calendar month,
//! except precipitation which is summed. Direction columns are never averaged directly: each
//! direction is paired with its magnitude and turned into eastward (`_u`) and northward
//! (`_v`) components first.

use crate::config::{EnvironmentConfig, EnvironmentSite};
use crate::sources::error::SourceError;
use crate::sources::loader::SourceLoader;
use crate::types::covariate::CovariateTable;
use crate::types::month::Month;
use crate::types::observation::PERIOD;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use log::{info, warn};
use polars::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
pub const MARINE_URL: &str = "https://marine-api.open-meteo.com/v1/marine";

pub const ATMOSPHERIC_VARIABLES: [&str; 5] = [
    "wind_speed_10m",
    "wind_direction_10m",
    "precipitation",
    "pressure_msl",
    "cloud_cover",
];

pub const MARINE_VARIABLES: [&str; 9] = [
    "wave_height",
    "wave_direction",
    "wave_period",
    "swell_wave_height",
    "swell_wave_direction",
    "swell_wave_period",
    "sea_surface_temperature",
    "ocean_current_velocity",
    "ocean_current_direction",
];

/// `(direction, magnitude)` pairs decomposed into vector components.
const DIRECTIONAL: [(&str, &str); 4] = [
    ("wave_direction", "wave_height"),
    ("swell_wave_direction", "swell_wave_height"),
    ("wind_direction_10m", "wind_speed_10m"),
    ("ocean_current_direction", "ocean_current_velocity"),
];

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Atmospheric,
    Marine,
}

impl Dataset {
    fn label(self) -> &'static str {
        match self {
            Dataset::Atmospheric => "atmospheric",
            Dataset::Marine => "marine",
        }
    }
}

#[derive(Debug, Deserialize)]
struct HourlyResponse {
    hourly: HourlySeries,
}

/// The `hourly` block: a `time` axis plus one array per requested variable.
#[derive(Debug, Deserialize)]
pub struct HourlySeries {
    pub time: Vec<String>,
    #[serde(flatten)]
    pub values: BTreeMap<String, Vec<Option<f64>>>,
}

/// Client for the two Open-Meteo endpoints, backed by a [`SourceLoader`] cache.
pub struct OpenMeteo<'a> {
    loader: &'a SourceLoader,
    config: &'a EnvironmentConfig,
}

impl<'a> OpenMeteo<'a> {
    pub fn new(loader: &'a SourceLoader, config: &'a EnvironmentConfig) -> Self {
        Self { loader, config }
    }

    /// Last day of the previous calendar month unless the config pins an end date.
    fn end_date(&self) -> NaiveDate {
        self.config.end.unwrap_or_else(|| {
            let today = Utc::now().date_naive();
            today.with_day(1).unwrap_or(today).pred_opt().unwrap_or(today)
        })
    }

    pub fn request_url(&self, site: &EnvironmentSite, dataset: Dataset) -> String {
        let (base, variables, extra) = match dataset {
            Dataset::Atmospheric => (
                &self.config.archive_url,
                &self.config.atmospheric,
                "&models=era5&cell_selection=sea",
            ),
            Dataset::Marine => (&self.config.marine_url, &self.config.marine, "&cell_selection=sea"),
        };
        format!(
            "{}?latitude={}&longitude={}&start_date={}&end_date={}&hourly={}&timezone=GMT{}",
            base,
            site.latitude,
            site.longitude,
            self.config.start.format("%Y-%m-%d"),
            self.end_date().format("%Y-%m-%d"),
            variables.join(","),
            extra
        )
    }

    pub async fn hourly(
        &self,
        site: &EnvironmentSite,
        dataset: Dataset,
    ) -> Result<HourlySeries, SourceError> {
        let url = self.request_url(site, dataset);
        let cache_name = format!(
            "open_meteo_{}_{}_{}.json",
            site.name,
            dataset.label(),
            self.end_date().format("%Y%m")
        );
        let bytes = self.loader.fetch_bytes(&url, &cache_name).await?;
        parse_hourly(&bytes, &cache_name)
    }

    /// One monthly-global table per site and dataset that could be fetched.
    ///
    /// Failures are logged and skipped, so an unreachable API only costs its columns.
    pub async fn monthly_tables(&self) -> Vec<CovariateTable> {
        let mut tables = Vec::new();
        for site in &self.config.sites {
            for dataset in [Dataset::Atmospheric, Dataset::Marine] {
                let requested = match dataset {
                    Dataset::Atmospheric => &self.config.atmospheric,
                    Dataset::Marine => &self.config.marine,
                };
                if requested.is_empty() {
                    continue;
                }
                let monthly = self
                    .hourly(site, dataset)
                    .await
                    .and_then(|series| {
                        monthly_environment(&series, &site.name).map_err(SourceError::from)
                    });
                match monthly {
                    Ok(frame) if frame.width() > 1 => {
                        info!(
                            "Open-Meteo {} data for '{}': {} months, {} columns",
                            dataset.label(),
                            site.name,
                            frame.height(),
                            frame.width() - 1
                        );
                        let name = format!("{}_{}", site.name, dataset.label());
                        tables.push(CovariateTable::monthly_global(name, frame));
                    }
                    Ok(_) => warn!(
                        "Open-Meteo {} data for '{}' has no usable columns",
                        dataset.label(),
                        site.name
                    ),
                    Err(e) => warn!(
                        "Skipping Open-Meteo {} data for '{}': {}",
                        dataset.label(),
                        site.name,
                        e
                    ),
                }
            }
        }
        tables
    }
}

pub fn parse_hourly(bytes: &[u8], source_name: &str) -> Result<HourlySeries, SourceError> {
    let response: HourlyResponse =
        serde_json::from_slice(bytes).map_err(|source| SourceError::JsonParse {
            source_name: source_name.to_string(),
            source,
        })?;
    Ok(response.hourly)
}

/// Eastward and northward components of a vector given as magnitude and a compass bearing.
pub fn vector_components(magnitude: f64, direction_degrees: f64) -> (f64, f64) {
    let radians = direction_degrees.to_radians();
    (magnitude * radians.sin(), magnitude * radians.cos())
}

/// `wind_speed_10m` -> `wind_10m`, `swell_wave_height` -> `swell_wave`.
fn component_stem(magnitude: &str) -> String {
    magnitude
        .replace("_height", "")
        .replace("_speed", "")
        .replace("_velocity", "")
}

fn scalar_name(prefix: &str, variable: &str) -> String {
    format!(
        "{}_{}",
        prefix,
        variable.to_lowercase().replace("sea_surface_", "sst_")
    )
}

fn aligned<'a>(series: &'a HourlySeries, name: &str, hours: usize) -> Option<&'a Vec<Option<f64>>> {
    series.values.get(name).filter(|values| values.len() == hours)
}

/// Aggregates an hourly series into one row per month, keyed by `period`.
///
/// Columns are prefixed with `prefix`. Hours with an unparseable timestamp are dropped.
pub fn monthly_environment(series: &HourlySeries, prefix: &str) -> PolarsResult<DataFrame> {
    let periods: Vec<Option<i32>> = series
        .time
        .iter()
        .map(|t| {
            NaiveDateTime::parse_from_str(t, TIME_FORMAT)
                .ok()
                .map(|dt| Month::from_date(dt.date()).period_index())
        })
        .collect();
    let hours = periods.len();

    let mut columns = vec![Column::new(PERIOD.into(), periods)];
    let mut aggregations = Vec::new();

    for (direction, magnitude) in DIRECTIONAL {
        let (Some(directions), Some(magnitudes)) = (aligned(series, direction, hours), aligned(series, magnitude, hours)) else {
            continue;
        };
        let (u, v): (Vec<Option<f64>>, Vec<Option<f64>>) = magnitudes
            .iter()
            .zip(directions)
            .map(|pair| match pair {
                (Some(m), Some(d)) => {
                    let (u, v) = vector_components(*m, *d);
                    (Some(u), Some(v))
                }
                _ => (None, None),
            })
            .unzip();
        let stem = component_stem(magnitude);
        for (suffix, values) in [("u", u), ("v", v)] {
            let name = format!("{prefix}_{stem}_{suffix}");
            aggregations.push(col(name.as_str()).mean());
            columns.push(Column::new(name.as_str().into(), values));
        }
    }

    let paired: Vec<&str> = DIRECTIONAL.iter().flat_map(|(d, m)| [*d, *m]).collect();
    for (variable, values) in &series.values {
        if paired.contains(&variable.as_str()) || values.len() != hours {
            continue;
        }
        let name = scalar_name(prefix, variable);
        let reduced = if variable.contains("precipitation") {
            col(name.as_str()).sum()
        } else {
            col(name.as_str()).mean()
        };
        aggregations.push(reduced);
        columns.push(Column::new(name.as_str().into(), values.clone()));
    }

    DataFrame::new(columns)?
        .lazy()
        .filter(col(PERIOD).is_not_null())
        .group_by([col(PERIOD)])
        .agg(aggregations)
        .sort([PERIOD], Default::default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PAYLOAD: &str = r#"{
        "latitude": 25.95,
        "longitude": -97.15,
        "hourly_units": { "time": "iso8601" },
        "hourly": {
            "time": ["2023-01-31T22:00", "2023-01-31T23:00", "2023-02-01T00:00", "not-a-time"],
            "wind_speed_10m": [10.0, 20.0, 4.0, 99.0],
            "wind_direction_10m": [90.0, 90.0, null, 0.0],
            "precipitation": [0.5, 1.5, 0.25, 7.0],
            "sea_surface_temperature": [20.0, 22.0, null, 30.0]
        }
    }"#;

    fn assert_close(a: Option<f64>, b: f64) {
        let a = a.unwrap_or(f64::NAN);
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_vector_components() {
        let (u, v) = vector_components(10.0, 90.0);
        assert!((u - 10.0).abs() < 1e-9 && v.abs() < 1e-9);
        let (u, v) = vector_components(2.0, 180.0);
        assert!(u.abs() < 1e-9 && (v + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_monthly_aggregation() -> Result<(), Box<dyn std::error::Error>> {
        let series = parse_hourly(PAYLOAD.as_bytes(), "payload")?;
        let monthly = monthly_environment(&series, "rio_grande")?;

        assert_eq!(monthly.height(), 2);
        let periods: Vec<Option<i32>> = monthly.column(PERIOD)?.i32()?.into_iter().collect();
        assert_eq!(
            periods,
            vec![
                Some(Month::new(1, 2023).period_index()),
                Some(Month::new(2, 2023).period_index())
            ]
        );

        let names = monthly.get_column_names_str();
        assert!(!names.contains(&"rio_grande_wind_speed_10m"));
        assert!(!names.contains(&"rio_grande_wind_direction_10m"));

        let u = monthly.column("rio_grande_wind_10m_u")?.f64()?;
        assert_close(u.get(0), 15.0);
        // February's only hour has no direction.
        assert_eq!(u.get(1), None);
        let v = monthly.column("rio_grande_wind_10m_v")?.f64()?;
        assert!(v.get(0).is_some_and(|v| v.abs() < 1e-9));

        let rain = monthly.column("rio_grande_precipitation")?.f64()?;
        assert_close(rain.get(0), 2.0);
        assert_close(rain.get(1), 0.25);
        let sst = monthly.column("rio_grande_sst_temperature")?.f64()?;
        assert_close(sst.get(0), 21.0);
        Ok(())
    }

    #[test]
    fn test_payload_without_hourly_block_is_an_error() {
        let result = parse_hourly(br#"{"error": true, "reason": "bad range"}"#, "bad");
        assert!(matches!(result, Err(SourceError::JsonParse { .. })));
    }

    #[test]
    fn test_request_url() {
        let dir = tempdir().unwrap();
        let loader = SourceLoader::new(dir.path());
        let config = EnvironmentConfig {
            end: NaiveDate::from_ymd_opt(2023, 12, 31),
            atmospheric: vec!["precipitation".to_string(), "cloud_cover".to_string()],
            ..Default::default()
        };
        let client = OpenMeteo::new(&loader, &config);
        let url = client.request_url(&config.sites[0], Dataset::Atmospheric);
        assert!(url.starts_with(ARCHIVE_URL));
        assert!(url.contains("end_date=2023-12-31"));
        assert!(url.contains("hourly=precipitation,cloud_cover"));
        assert!(url.contains("models=era5"));
    }

    #[tokio::test]
    async fn test_cached_payload_becomes_a_monthly_table() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let config = EnvironmentConfig {
            archive_url: "http://127.0.0.1:9/archive".to_string(),
            marine_url: "http://127.0.0.1:9/marine".to_string(),
            end: NaiveDate::from_ymd_opt(2023, 2, 28),
            ..Default::default()
        };
        // Pad past the loader's minimum cache size; serde ignores trailing whitespace.
        let padded = format!("{PAYLOAD}{}", " ".repeat(1024));
        std::fs::write(
            dir.path().join("open_meteo_rio_grande_atmospheric_202302.json"),
            padded,
        )?;

        let loader = SourceLoader::new(dir.path());
        let tables = OpenMeteo::new(&loader, &config).monthly_tables().await;

        // The marine endpoint is unreachable and is skipped.
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "rio_grande_atmospheric");
        assert_eq!(tables[0].frame.height(), 2);
        assert!(tables[0]
            .value_columns()
            .contains(&"rio_grande_precipitation".to_string()));
        Ok(())
    }
}
