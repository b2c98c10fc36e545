use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Column '{column}' from covariate '{source_name}' collides with a column from '{owner}'; give one of them a prefix")]
    ColumnCollision {
        column: String,
        source_name: String,
        owner: String,
    },

    #[error("Covariate '{source_name}' is missing key column '{column}'")]
    MissingKeyColumn { source_name: String, column: String },

    #[error("Covariate '{source_name}' has no value columns")]
    NoValueColumns { source_name: String },

    #[error("Fusion changed the row count from {expected} to {found}")]
    RowCountChanged { expected: usize, found: usize },

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
