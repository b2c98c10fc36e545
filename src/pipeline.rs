//! The main entry point: runs ingestion, covariate acquisition, fusion, feature derivation
//! and model fitting in order, writing every intermediate artifact to the output directory.

use crate::config::{PipelineConfig, SheetSource};
use crate::error::PipelineError;
use crate::features::deriver::FeatureDeriver;
use crate::features::error::FeatureError;
use crate::frames::monthly_frame::{write_csv, FeatureFrame, FusedFrame, MonthlyFrame};
use crate::fusion::fuser::CovariateFuser;
use crate::geo::border::BorderLine;
use crate::geo::geography_table;
use crate::geo::land_route::LandRouteRule;
use crate::ingest::dedup::{apply_cutoff, deduplicate};
use crate::ingest::error::IngestError;
use crate::ingest::normalizer::SchemaNormalizer;
use crate::models::direct::DirectForecaster;
use crate::models::error::ModelError;
use crate::models::hybrid::fit_hybrid;
use crate::models::metrics::Metrics;
use crate::models::persist::{
    direct_forecasts_file, direct_model_file, direct_predictions_file, save_model,
    HYBRID_MODEL_FILE, HYBRID_PREDICTIONS_FILE,
};
use crate::models::sarimax::SarimaOrder;
use crate::sources::gdelt::GdeltEvents;
use crate::sources::loader::SourceLoader;
use crate::sources::open_meteo::OpenMeteo;
use crate::sources::placeholders::{economic_indicators, fips_crosswalk, reference_countries};
use crate::types::covariate::CovariateTable;
use crate::types::observation::{Observation, ObservationTable};
use crate::utils::{ensure_cache_dir_exists, get_cache_dir};
use bon::bon;
use log::{info, warn};
use polars::prelude::DataFrame;
use std::fmt;
use std::path::{Path, PathBuf};

pub const OBSERVATIONS_FILE: &str = "observations.csv";
pub const FEATURES_FILE: &str = "master_dataset_with_features.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Fuse,
    Derive,
    Model,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingest => "ingest",
            Stage::Fuse => "fuse",
            Stage::Derive => "derive",
            Stage::Model => "model",
        };
        f.write_str(name)
    }
}

/// Why a run stopped early. Halting is not an error: earlier artifacts are still written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halt {
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct HorizonReport {
    pub horizon: usize,
    pub metrics: Metrics,
    pub model_path: PathBuf,
    pub predictions_path: PathBuf,
    pub forecasts_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct HybridReport {
    pub order: SarimaOrder,
    pub aic: f64,
    pub metrics: Metrics,
    pub model_path: PathBuf,
    pub predictions_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ModelReport {
    pub direct: Vec<HorizonReport>,
    pub hybrid: Option<HybridReport>,
}

impl ModelReport {
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.hybrid.is_none()
    }

    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for h in &self.direct {
            paths.push(h.model_path.clone());
            paths.push(h.predictions_path.clone());
            paths.push(h.forecasts_path.clone());
        }
        if let Some(hybrid) = &self.hybrid {
            paths.push(hybrid.model_path.clone());
            paths.push(hybrid.predictions_path.clone());
        }
        paths
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub halted: Option<Halt>,
    pub observations: usize,
    pub nationalities: usize,
    pub feature_rows: usize,
    /// Derived feature columns that were actually produced.
    pub feature_columns: Vec<String>,
    pub models: ModelReport,
    pub artifacts: Vec<PathBuf>,
}

impl PipelineReport {
    pub fn completed(&self) -> bool {
        self.halted.is_none()
    }

    fn halt(mut self, stage: Stage, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!("Pipeline halted at {} stage: {}", stage, reason);
        self.halted = Some(Halt { stage, reason });
        self
    }
}

/// Runs the encounter forecasting pipeline.
///
/// Remote downloads (the two encounter sheets and GDELT exports) are cached in the cache
/// folder; every output lands in [`PipelineConfig::output_dir`].
///
/// # Examples
///
/// ```rust
/// # use border_flows::{MigrationPipeline, PipelineConfig, PipelineError};
/// # async fn run() -> Result<(), PipelineError> {
/// let pipeline = MigrationPipeline::new().await?.with_config(PipelineConfig {
///     horizons: vec![1],
///     ..Default::default()
/// });
/// let report = pipeline.run().await?;
/// for horizon in &report.models.direct {
///     println!("t+{}: {}", horizon.horizon, horizon.metrics);
/// }
/// # Ok(())
/// # }
/// ```
pub struct MigrationPipeline {
    loader: SourceLoader,
    config: PipelineConfig,
}

#[bon]
impl MigrationPipeline {
    /// Creates a pipeline with the default configuration that caches downloads in
    /// `cache_folder`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CacheDirCreation`] if the directory cannot be created.
    pub async fn with_cache_folder(cache_folder: PathBuf) -> Result<Self, PipelineError> {
        ensure_cache_dir_exists(&cache_folder)
            .await
            .map_err(|e| PipelineError::CacheDirCreation(cache_folder.clone(), e))?;
        Ok(Self {
            loader: SourceLoader::new(&cache_folder),
            config: PipelineConfig::default(),
        })
    }

    /// Creates a pipeline caching into the platform cache directory
    /// (e.g. `~/.cache/border_flows_cache` on Linux).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CacheDirResolution`] if there is no platform cache directory
    /// and [`PipelineError::CacheDirCreation`] if it cannot be created.
    pub async fn new() -> Result<Self, PipelineError> {
        let cache_folder = get_cache_dir().map_err(PipelineError::CacheDirResolution)?;
        Self::with_cache_folder(cache_folder).await
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Downloads both encounter sheets and merges them into one observation table.
    ///
    /// A sheet that cannot be downloaded or parsed is logged and treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Empty`] (wrapped) when neither sheet yields a row.
    pub async fn ingest(&self) -> Result<ObservationTable, PipelineError> {
        let primary = self.fetch_sheet(&self.config.primary_sheet).await;
        let secondary = self.fetch_sheet(&self.config.secondary_sheet).await;
        self.ingest_frames(primary.as_ref(), secondary.as_ref())
    }

    /// Normalizes already-loaded wide sheets, applies the primary cutoff and merges them.
    pub fn ingest_frames(
        &self,
        primary: Option<&DataFrame>,
        secondary: Option<&DataFrame>,
    ) -> Result<ObservationTable, PipelineError> {
        let normalizer = SchemaNormalizer::default();
        let primary_rows = normalize_or_skip(
            &normalizer,
            &self.config.primary_sheet.cache_name,
            primary,
        );
        let primary_rows = apply_cutoff(primary_rows, self.config.primary_cutoff);
        let secondary_rows = normalize_or_skip(
            &normalizer,
            &self.config.secondary_sheet.cache_name,
            secondary,
        );

        let table = deduplicate(primary_rows, secondary_rows);
        if table.is_empty() {
            return Err(IngestError::Empty.into());
        }
        if let Some((first, last)) = table.month_range() {
            info!(
                "Ingested {} observations for {} nationalities, {} to {}",
                table.len(),
                table.nationalities().len(),
                first,
                last
            );
        }
        Ok(table)
    }

    /// Collects every covariate table: static geography, labour-market indicators, monthly
    /// GDELT conflict counts and monthly Open-Meteo weather per configured site.
    pub async fn acquire(&self) -> Result<Vec<CovariateTable>, PipelineError> {
        let mut tables = self.static_covariates()?;
        let gdelt = &self.config.gdelt;
        let events = GdeltEvents::new(&self.loader, gdelt.base_url.clone())
            .with_root_codes(gdelt.root_codes.clone())
            .monthly_counts(&gdelt.days)
            .await;
        info!("Acquired {} monthly GDELT rows", events.frame.height());
        tables.push(events);

        let environment = OpenMeteo::new(&self.loader, &self.config.environment)
            .monthly_tables()
            .await;
        info!("Acquired {} environmental tables", environment.len());
        tables.extend(environment);
        Ok(tables)
    }

    /// The covariates that need no download.
    pub fn static_covariates(&self) -> Result<Vec<CovariateTable>, PipelineError> {
        let rule = self
            .config
            .island_exceptions
            .iter()
            .fold(LandRouteRule::default(), |rule, iso| {
                rule.with_exception(iso.clone())
            });
        let geography = geography_table(&reference_countries(), &BorderLine::us_mexico(), &rule)?;
        Ok(vec![geography, economic_indicators()?])
    }

    pub fn fuse(
        &self,
        observations: &ObservationTable,
        covariates: &[CovariateTable],
    ) -> Result<FusedFrame, PipelineError> {
        let fuser = CovariateFuser::new(
            fips_crosswalk(&reference_countries()),
            self.config.fill.clone(),
        );
        Ok(fuser.fuse(observations, covariates)?)
    }

    pub fn derive(&self, fused: &FusedFrame) -> Result<FeatureFrame, PipelineError> {
        Ok(FeatureDeriver::new(self.config.features.clone()).derive(fused)?)
    }

    /// Fits one direct forest per horizon and the SARIMAX + forest hybrid, saving each model
    /// with its held-out predictions.
    ///
    /// A model without enough usable rows is logged and skipped.
    ///
    /// # Arguments
    ///
    /// * `.features(&FeatureFrame)`: **Required.**
    /// * `.horizons(Vec<usize>)`: Optional. Defaults to [`PipelineConfig::horizons`].
    /// * `.skip_hybrid(bool)`: Optional. Defaults to `false`.
    #[builder]
    pub fn model(
        &self,
        features: &FeatureFrame,
        horizons: Option<Vec<usize>>,
        skip_hybrid: Option<bool>,
    ) -> Result<ModelReport, PipelineError> {
        let horizons = horizons.unwrap_or_else(|| self.config.horizons.clone());
        let out = &self.config.output_dir;
        let forecaster = DirectForecaster::new(self.config.forest, self.config.split);
        let mut report = ModelReport::default();

        for horizon in horizons {
            let outcome = match forecaster.fit_horizon(&features.frame, horizon) {
                Ok(outcome) => outcome,
                Err(e) if is_data_shortage(&e) => {
                    warn!("Skipping t+{} forest: {}", horizon, e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let model_path = out.join(direct_model_file(horizon));
            let predictions_path = out.join(direct_predictions_file(horizon));
            let forecasts_path = out.join(direct_forecasts_file(horizon));
            save_model(&outcome.model, &model_path)?;
            write_csv(&outcome.predictions, &predictions_path)?;
            write_csv(&outcome.forecasts, &forecasts_path)?;
            report.direct.push(HorizonReport {
                horizon,
                metrics: outcome.metrics,
                model_path,
                predictions_path,
                forecasts_path,
            });
        }

        if skip_hybrid.unwrap_or(false) {
            return Ok(report);
        }
        match fit_hybrid(&features.frame, &self.config.hybrid) {
            Ok(outcome) => {
                let model_path = out.join(HYBRID_MODEL_FILE);
                let predictions_path = out.join(HYBRID_PREDICTIONS_FILE);
                save_model(&outcome.model, &model_path)?;
                write_csv(&outcome.predictions, &predictions_path)?;
                report.hybrid = Some(HybridReport {
                    order: outcome.model.sarimax.order(),
                    aic: outcome.model.sarimax.aic(),
                    metrics: outcome.metrics,
                    model_path,
                    predictions_path,
                });
            }
            Err(e) if is_data_shortage(&e) || matches!(e, ModelError::NoViableOrder) => {
                warn!("Skipping hybrid model: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(report)
    }

    /// Runs every stage, downloading what is not cached.
    ///
    /// A stage left with no usable rows halts the run; the returned report says where.
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let observations = match self.ingest().await {
            Ok(table) => table,
            Err(PipelineError::Ingest(IngestError::Empty)) => {
                return Ok(PipelineReport::default()
                    .halt(Stage::Ingest, "no observations after ingestion"));
            }
            Err(e) => return Err(e),
        };
        let covariates = self.acquire().await?;
        self.run_from(&observations, &covariates)
    }

    /// Runs fusion, feature derivation and modelling on prepared inputs.
    pub fn run_from(
        &self,
        observations: &ObservationTable,
        covariates: &[CovariateTable],
    ) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport {
            observations: observations.len(),
            nationalities: observations.nationalities().len(),
            ..Default::default()
        };
        if observations.is_empty() {
            return Ok(report.halt(Stage::Ingest, "no observations after ingestion"));
        }
        let out = self.config.output_dir.as_path();
        report.artifacts.push(write_artifact(
            &observations.to_frame()?,
            out,
            OBSERVATIONS_FILE,
        )?);

        let fused = self.fuse(observations, covariates)?;
        if fused.height() == 0 {
            return Ok(report.halt(Stage::Fuse, "fusion produced no rows"));
        }

        let features = match self.derive(&fused) {
            Ok(features) => features,
            Err(PipelineError::Feature(FeatureError::Empty)) => {
                return Ok(report.halt(Stage::Derive, "no rows to derive features from"));
            }
            Err(e) => return Err(e),
        };
        report.feature_rows = features.height();
        report.feature_columns = features.feature_columns.clone();
        report
            .artifacts
            .push(write_artifact(&features.frame, out, FEATURES_FILE)?);

        let models = self.model().features(&features).call()?;
        if models.is_empty() {
            return Ok(report.halt(Stage::Model, "no model had enough usable rows"));
        }
        for h in &models.direct {
            info!("t+{} forest: {}", h.horizon, h.metrics);
        }
        if let Some(hybrid) = &models.hybrid {
            info!("Hybrid {}: {}", hybrid.order, hybrid.metrics);
        }
        report.artifacts.extend(models.artifacts());
        report.models = models;
        Ok(report)
    }

    async fn fetch_sheet(&self, source: &SheetSource) -> Option<DataFrame> {
        match self.loader.fetch_sheet(&source.url, &source.cache_name).await {
            Ok(df) => Some(df),
            Err(e) => {
                warn!("Could not load sheet '{}': {}", source.cache_name, e);
                None
            }
        }
    }
}

fn normalize_or_skip(
    normalizer: &SchemaNormalizer,
    sheet: &str,
    frame: Option<&DataFrame>,
) -> Vec<Observation> {
    let Some(frame) = frame else {
        return Vec::new();
    };
    normalizer.normalize(sheet, frame).unwrap_or_else(|e| {
        warn!("Ignoring sheet '{}': {}", sheet, e);
        Vec::new()
    })
}

fn write_artifact(df: &DataFrame, dir: &Path, name: &str) -> Result<PathBuf, PipelineError> {
    let path = dir.join(name);
    write_csv(df, &path)?;
    info!("Wrote {} rows to {:?}", df.height(), path);
    Ok(path)
}

fn is_data_shortage(e: &ModelError) -> bool {
    matches!(
        e,
        ModelError::EmptyTrainingSet
            | ModelError::InsufficientDates { .. }
            | ModelError::SeriesTooShort { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::forest::ForestParams;
    use crate::models::grid::SarimaGrid;
    use crate::models::hybrid::HybridSpec;
    use crate::models::direct::DirectModel;
    use crate::models::persist::load_model;
    use crate::types::month::Month;
    use tempfile::{tempdir, TempDir};

    const UNREACHABLE: &str = "http://127.0.0.1:9/sheet.csv";
    const NATIONALITIES: [&str; 3] = ["Mexico", "Guatemala", "Honduras"];

    fn encounters(k: usize, month: Month) -> i64 {
        let m = i64::from(month.months_since(Month::new(1, 2020)));
        1_000 * (k as i64 + 1) + 37 * m + 11 * i64::from(month.month())
    }

    /// A wide sheet in the published layout: quoted values with thousands separators and
    /// a totals row.
    fn wide_sheet(first: Month, months: i32, bump: i64) -> String {
        let months: Vec<Month> = (0..months).map(|i| first.add_months(i)).collect();
        let mut text = String::from("Nationality");
        for day in months.iter().filter_map(|m| m.first_day()) {
            text.push_str(&format!(",{}", day.format("%b %Y")));
        }
        text.push('\n');
        for (k, nationality) in NATIONALITIES.iter().enumerate() {
            text.push_str(&format!("  {}", nationality.to_uppercase()));
            for m in &months {
                let v = encounters(k, *m) + bump;
                text.push_str(&format!(",\"{},{:03}\"", v / 1000, v % 1000));
            }
            text.push('\n');
        }
        text.push_str("Total");
        for _ in &months {
            text.push_str(",\"99,999\"");
        }
        text.push('\n');
        text
    }

    async fn seeded_pipeline(dir: &TempDir) -> Result<MigrationPipeline, Box<dyn std::error::Error>> {
        let cache = dir.path().join("cache");
        let pipeline = MigrationPipeline::with_cache_folder(cache.clone()).await?;
        let mut config = PipelineConfig::default();
        config.primary_sheet.url = UNREACHABLE.to_string();
        config.secondary_sheet.url = UNREACHABLE.to_string();
        config.gdelt.days = vec![];
        config.environment.sites = vec![];
        config.output_dir = dir.path().join("output");
        config.forest = ForestParams {
            n_estimators: 10,
            ..Default::default()
        };
        config.hybrid = HybridSpec {
            grid: SarimaGrid {
                max_p: 1,
                max_d: 1,
                max_q: 0,
                max_seasonal_p: 0,
                max_seasonal_d: 0,
                max_seasonal_q: 0,
                period: 12,
            },
            forest: config.forest,
            ..Default::default()
        };

        let primary = wide_sheet(Month::new(1, 2022), 32, 1);
        let secondary = wide_sheet(Month::new(1, 2020), 36, 0);
        std::fs::write(cache.join(&config.primary_sheet.cache_name), primary)?;
        std::fs::write(cache.join(&config.secondary_sheet.cache_name), secondary)?;
        Ok(pipeline.with_config(config))
    }

    #[tokio::test]
    async fn test_ingest_prefers_primary_and_applies_cutoff() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pipeline = seeded_pipeline(&dir).await?;
        let table = pipeline.ingest().await?;

        // Jan 2020 through Jun 2024; July and August 2024 fall after the cutoff.
        assert_eq!(table.len(), 3 * 54);
        assert_eq!(
            table.month_range(),
            Some((Month::new(1, 2020), Month::new(6, 2024)))
        );
        assert_eq!(
            table.nationalities().into_iter().collect::<Vec<_>>(),
            vec!["Guatemala", "Honduras", "Mexico"]
        );

        let find = |nationality: &str, month: Month| {
            table
                .rows()
                .iter()
                .find(|o| o.nationality == nationality && o.month == month)
                .map(|o| o.encounters)
        };
        let overlap = Month::new(3, 2022);
        assert_eq!(find("Mexico", overlap), Some(encounters(0, overlap) + 1));
        let older = Month::new(3, 2021);
        assert_eq!(find("Mexico", older), Some(encounters(0, older)));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_writes_every_artifact() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pipeline = seeded_pipeline(&dir).await?;
        let report = pipeline.run().await?;

        assert!(report.completed(), "halted: {:?}", report.halted);
        assert_eq!(report.observations, 3 * 54);
        assert_eq!(report.nationalities, 3);
        assert_eq!(report.feature_rows, 3 * 54);
        assert_eq!(
            report.models.direct.iter().map(|h| h.horizon).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert!(report.models.hybrid.is_some());

        let out = dir.path().join("output");
        for name in [
            OBSERVATIONS_FILE,
            FEATURES_FILE,
            "rf_model_t1.bin",
            "predictions_t1.csv",
            "forecasts_t3.csv",
            HYBRID_MODEL_FILE,
            HYBRID_PREDICTIONS_FILE,
        ] {
            assert!(out.join(name).is_file(), "missing {name}");
        }
        assert_eq!(report.artifacts.len(), 2 + 2 * 3 + 2);

        let model: DirectModel = load_model(&out.join(direct_model_file(3)))?;
        assert_eq!(model.horizon, 3);
        assert_eq!(model.nationalities, vec!["Guatemala", "Honduras", "Mexico"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_sheets_halt_at_ingest() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut config = PipelineConfig::default();
        config.primary_sheet.url = UNREACHABLE.to_string();
        config.secondary_sheet.url = UNREACHABLE.to_string();
        config.output_dir = dir.path().join("output");
        let pipeline = MigrationPipeline::with_cache_folder(dir.path().join("cache"))
            .await?
            .with_config(config);

        let report = pipeline.run().await?;
        assert_eq!(report.halted.map(|h| h.stage), Some(Stage::Ingest));
        assert!(report.artifacts.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_short_history_halts_at_model() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let config = PipelineConfig {
            output_dir: dir.path().join("output"),
            ..Default::default()
        };
        let pipeline = MigrationPipeline::with_cache_folder(dir.path().join("cache"))
            .await?
            .with_config(config);
        let rows = (1..=3)
            .map(|m| Observation::new("Mexico", Month::new(m, 2023), 100 * i64::from(m)))
            .collect();
        let observations = deduplicate(rows, vec![]);

        let report = pipeline.run_from(&observations, &pipeline.static_covariates()?)?;
        assert_eq!(report.halted.map(|h| h.stage), Some(Stage::Model));
        assert_eq!(report.feature_rows, 3);
        assert_eq!(report.artifacts.len(), 2);
        Ok(())
    }
}
