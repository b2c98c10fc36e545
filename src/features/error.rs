use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Cannot derive features from an empty frame")]
    Empty,

    #[error("Fused frame is missing key column '{0}'")]
    MissingKeyColumn(String),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
