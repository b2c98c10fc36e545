use crate::config::ConfigError;
use crate::features::error::FeatureError;
use crate::frames::error::FrameError;
use crate::fusion::error::FusionError;
use crate::ingest::error::IngestError;
use crate::models::error::ModelError;
use crate::sources::error::SourceError;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Fusion(#[from] FusionError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),
}
