mod config;
mod error;
mod features;
mod frames;
mod fusion;
mod geo;
mod ingest;
mod models;
mod pipeline;
mod sources;
mod types;
mod utils;

pub use config::*;
pub use error::PipelineError;
pub use pipeline::*;

pub use types::country::*;
pub use types::covariate::*;
pub use types::feature_spec::*;
pub use types::fill_policy::*;
pub use types::month::Month;
pub use types::observation::*;

pub use frames::monthly_frame::{FeatureFrame, FusedFrame, MonthlyFrame};
pub use ingest::dedup::{apply_cutoff, deduplicate};
pub use ingest::normalizer::SchemaNormalizer;
pub use sources::gdelt::{event_covariate, GdeltEvents, CONFLICT_ROOT_CODES, EVENT_COUNT};
pub use sources::loader::SourceLoader;
pub use sources::open_meteo::{monthly_environment, vector_components, OpenMeteo};
pub use sources::placeholders::{
    economic_indicators, fips_crosswalk, reference_countries, US_CONSTRUCTION_JOB_OPENINGS,
    US_HOSPITALITY_JOB_OPENINGS,
};
pub use geo::border::BorderLine;
pub use geo::land_route::LandRouteRule;
pub use geo::{geography_table, DISTANCE_KM, LAND_ROUTE};
pub use fusion::fuser::CovariateFuser;
pub use features::deriver::{FeatureDeriver, MONTH, QUARTER, TIME_INDEX, YEAR};

pub use models::direct::{next_period_forecasts, DirectForecaster, DirectModel, DirectOutcome};
pub use models::forest::{ForestParams, RandomForest};
pub use models::grid::{search as search_sarima_orders, GridOutcome, SarimaGrid};
pub use models::hybrid::{fit_hybrid, monthly_totals, HybridModel, HybridOutcome, HybridSpec};
pub use models::metrics::Metrics;
pub use models::persist::{load_model, save_model};
pub use models::sarimax::{SarimaOrder, Sarimax};
pub use models::split::{chronological_split, SplitStrategy, TrainTest};

pub use features::error::FeatureError;
pub use frames::error::FrameError;
pub use fusion::error::FusionError;
pub use ingest::error::IngestError;
pub use models::error::ModelError;
pub use sources::error::SourceError;
