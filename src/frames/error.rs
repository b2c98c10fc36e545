use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Failed to create output directory '{0}'")]
    OutputDirCreation(PathBuf, #[source] std::io::Error),

    #[error("I/O error writing CSV file '{0}'")]
    CsvWriteIo(PathBuf, #[source] std::io::Error),

    #[error("Encoding error writing CSV file '{0}'")]
    CsvWritePolars(PathBuf, #[source] PolarsError),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
