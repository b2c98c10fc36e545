use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to read cache file '{0}'")]
    CacheRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write cache file '{0}'")]
    CacheWrite(PathBuf, #[source] std::io::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Data download or decompression failed")]
    DownloadIo(#[from] std::io::Error),

    #[error("I/O error processing CSV data for '{source_name}'")]
    CsvReadIo {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parsing error processing CSV data for '{source_name}'")]
    CsvReadPolars {
        source_name: String,
        #[source]
        source: PolarsError,
    },

    #[error("Unexpected JSON payload in '{source_name}'")]
    JsonParse {
        source_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected at least {expected} columns in '{source_name}', found {found}")]
    SchemaMismatch {
        source_name: String,
        expected: usize,
        found: usize,
    },

    #[error("Failed to open zip archive downloaded from {url}")]
    ZipArchive {
        url: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Zip archive has no readable entry '{entry}'")]
    ZipEntry {
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("I/O error writing parquet cache file '{0}'")]
    ParquetWriteIo(PathBuf, #[source] std::io::Error),

    #[error("Encoding error writing parquet cache file '{0}'")]
    ParquetWritePolars(PathBuf, #[source] PolarsError),

    #[error("Failed to scan parquet cache file '{0}'")]
    ParquetScan(PathBuf, #[source] PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
