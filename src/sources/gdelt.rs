//! Conflict event counts from the GDELT 1.0 daily event export.
//!
//! Each export is a zip archive holding one headerless, tab separated file with 58 columns
//! per event. Only three columns are used: the event day (`SQLDATE`, column 2), the CAMEO
//! root code (`EventRootCode`, column 29) and the FIPS country code of the action location
//! (`ActionGeo_CountryCode`, column 52).

use crate::sources::error::SourceError;
use crate::sources::loader::{csv_to_dataframe, CsvLayout, SourceLoader};
use crate::types::covariate::{Aggregation, CovariateTable, COUNTRY_CODE};
use crate::types::month::Month;
use crate::types::observation::PERIOD;
use chrono::NaiveDate;
use log::{info, warn};
use polars::prelude::*;
use std::io::{Cursor, Read};
use std::path::Path;
use tokio::{fs, task};

pub const DEFAULT_BASE_URL: &str = "http://data.gdeltproject.org/events";

/// CAMEO root codes for protest, coercion, assault, fight and mass violence.
pub const CONFLICT_ROOT_CODES: [&str; 5] = ["14", "17", "18", "19", "20"];

pub const EVENT_COUNT: &str = "event_count";
const DAY: &str = "day";
const ROOT_CODE: &str = "root_code";

const DAY_COLUMN: &str = "column_2";
const ROOT_CODE_COLUMN: &str = "column_29";
const COUNTRY_COLUMN: &str = "column_52";
const MIN_EXPORT_COLUMNS: usize = 52;

/// Client for daily GDELT exports, backed by a [`SourceLoader`] cache.
pub struct GdeltEvents<'a> {
    loader: &'a SourceLoader,
    base_url: String,
    root_codes: Vec<String>,
}

impl<'a> GdeltEvents<'a> {
    pub fn new(loader: &'a SourceLoader, base_url: impl Into<String>) -> Self {
        Self {
            loader,
            base_url: base_url.into(),
            root_codes: CONFLICT_ROOT_CODES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn with_root_codes(mut self, root_codes: Vec<String>) -> Self {
        self.root_codes = root_codes;
        self
    }

    pub fn export_url(&self, day: NaiveDate) -> String {
        format!(
            "{}/{}.export.CSV.zip",
            self.base_url.trim_end_matches('/'),
            day.format("%Y%m%d")
        )
    }

    /// Per-day, per-country conflict counts for one export day.
    ///
    /// Parsed counts are cached as parquet, so a day is only downloaded and scanned once.
    pub async fn daily_counts(&self, day: NaiveDate) -> Result<DataFrame, SourceError> {
        let stamp = day.format("%Y%m%d").to_string();
        let parquet_path = self.loader.cache_dir().join(format!("gdelt_{stamp}.parquet"));

        if fs::metadata(&parquet_path).await.is_ok() {
            info!("Cache hit for GDELT counts of {} at {:?}", stamp, parquet_path);
        } else {
            let url = self.export_url(day);
            let archive = self.loader.fetch_bytes(&url, &format!("{stamp}.export.CSV.zip")).await?;
            let entry = format!("{stamp}.export.CSV");
            let tsv = task::spawn_blocking({
                let url = url.clone();
                move || unzip_entry(&archive, &url, &entry)
            })
            .await??;
            let raw = csv_to_dataframe(tsv, &stamp, CsvLayout::Tsv).await?;
            let counts = count_conflict_events(raw, &self.root_codes, &stamp)?;
            info!("GDELT {}: {} (day, country) conflict counts", stamp, counts.height());
            cache_dataframe(counts, &parquet_path).await?;
        }

        LazyFrame::scan_parquet(&parquet_path, Default::default())
            .and_then(|lf| lf.collect())
            .map_err(|e| SourceError::ParquetScan(parquet_path.clone(), e))
    }

    /// Monthly conflict counts per country over `days`.
    ///
    /// A day that cannot be fetched or parsed is logged and skipped. If every day fails the
    /// result is an empty table with the right schema.
    pub async fn monthly_counts(&self, days: &[NaiveDate]) -> CovariateTable {
        let mut frames = Vec::with_capacity(days.len());
        for day in days {
            match self.daily_counts(*day).await {
                Ok(frame) => frames.push(frame),
                Err(e) => warn!("Skipping GDELT export for {}: {}", day, e),
            }
        }
        let table = stack_daily(frames).and_then(monthly_event_table);
        match table {
            Ok(frame) => event_covariate(frame),
            Err(e) => {
                warn!("Failed to aggregate GDELT counts: {}", e);
                event_covariate(empty_monthly_events())
            }
        }
    }
}

/// Wraps a `(country_code, period, event_count)` frame as a summed per-country covariate.
pub fn event_covariate(frame: DataFrame) -> CovariateTable {
    CovariateTable::country_monthly("gdelt", frame).with_aggregation(Aggregation::Sum)
}

fn unzip_entry(archive: &[u8], url: &str, entry: &str) -> Result<Vec<u8>, SourceError> {
    let mut zip = ::zip::ZipArchive::new(Cursor::new(archive)).map_err(|source| {
        SourceError::ZipArchive {
            url: url.to_string(),
            source,
        }
    })?;
    let mut file = zip.by_name(entry).map_err(|source| SourceError::ZipEntry {
        entry: entry.to_string(),
        source,
    })?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Filters a raw export to conflict root codes and counts events per `(day, country_code)`.
pub fn count_conflict_events(
    raw: DataFrame,
    root_codes: &[String],
    source_name: &str,
) -> Result<DataFrame, SourceError> {
    if raw.width() < MIN_EXPORT_COLUMNS {
        return Err(SourceError::SchemaMismatch {
            source_name: source_name.to_string(),
            expected: MIN_EXPORT_COLUMNS,
            found: raw.width(),
        });
    }

    let is_conflict = root_codes
        .iter()
        .map(|code| col(ROOT_CODE).eq(lit(code.as_str())))
        .reduce(|a, b| a.or(b))
        .unwrap_or(lit(false));

    let counts = raw
        .lazy()
        .select([
            col(DAY_COLUMN).alias(DAY),
            col(ROOT_CODE_COLUMN).alias(ROOT_CODE),
            col(COUNTRY_COLUMN).alias(COUNTRY_CODE),
        ])
        .filter(
            is_conflict
                .and(col(COUNTRY_CODE).is_not_null())
                .and(col(COUNTRY_CODE).neq(lit(""))),
        )
        .group_by([col(DAY), col(COUNTRY_CODE)])
        .agg([len().cast(DataType::Float64).alias(EVENT_COUNT)])
        .sort([DAY, COUNTRY_CODE], Default::default())
        .collect()?;
    Ok(counts)
}

fn stack_daily(frames: Vec<DataFrame>) -> PolarsResult<DataFrame> {
    let mut frames = frames.into_iter();
    let Some(mut stacked) = frames.next() else {
        return Ok(empty_daily_events());
    };
    for frame in frames {
        stacked.vstack_mut(&frame)?;
    }
    Ok(stacked)
}

/// Sums daily `(day, country_code, event_count)` rows into `(country_code, period, event_count)`.
///
/// Rows whose `day` is not a `YYYYMMDD` date are dropped.
pub fn monthly_event_table(daily: DataFrame) -> PolarsResult<DataFrame> {
    let periods: Vec<Option<i32>> = daily
        .column(DAY)?
        .str()?
        .into_iter()
        .map(|day| {
            day.and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
                .map(|d| Month::from_date(d).period_index())
        })
        .collect();

    let mut daily = daily;
    daily.with_column(Column::new(PERIOD.into(), periods))?;

    daily
        .lazy()
        .filter(col(PERIOD).is_not_null())
        .group_by([col(COUNTRY_CODE), col(PERIOD)])
        .agg([col(EVENT_COUNT).sum()])
        .sort([COUNTRY_CODE, PERIOD], Default::default())
        .collect()
}

pub fn empty_daily_events() -> DataFrame {
    DataFrame::new(vec![
        Column::new(DAY.into(), Vec::<String>::new()),
        Column::new(COUNTRY_CODE.into(), Vec::<String>::new()),
        Column::new(EVENT_COUNT.into(), Vec::<f64>::new()),
    ])
    .unwrap_or_default()
}

pub fn empty_monthly_events() -> DataFrame {
    DataFrame::new(vec![
        Column::new(COUNTRY_CODE.into(), Vec::<String>::new()),
        Column::new(PERIOD.into(), Vec::<i32>::new()),
        Column::new(EVENT_COUNT.into(), Vec::<f64>::new()),
    ])
    .unwrap_or_default()
}

async fn cache_dataframe(mut df: DataFrame, path: &Path) -> Result<(), SourceError> {
    let path_buf = path.to_path_buf();
    task::spawn_blocking(move || {
        let file = std::fs::File::create(&path_buf)
            .map_err(|e| SourceError::ParquetWriteIo(path_buf.clone(), e))?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut df)
            .map_err(|e| SourceError::ParquetWritePolars(path_buf, e))?;
        Ok::<(), SourceError>(())
    })
    .await??;
    Ok(())
}
