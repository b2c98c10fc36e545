use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Sheet '{sheet}' has no period columns after the label column")]
    MissingPeriodColumns { sheet: String },

    #[error("Sheet '{sheet}' contains no parseable period headers")]
    NoParseablePeriods { sheet: String },

    #[error("Polars operation failed while reshaping sheet '{sheet}'")]
    Reshape {
        sheet: String,
        #[source]
        source: PolarsError,
    },

    #[error("No observations left after ingestion")]
    Empty,
}
