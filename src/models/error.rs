use crate::frames::error::FrameError;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("No rows left to train on")]
    EmptyTrainingSet,

    #[error("Chronological split needs at least 2 distinct months, found {found}")]
    InsufficientDates { found: usize },

    #[error("Series too short: need at least {needed} points, got {found}")]
    SeriesTooShort { needed: usize, found: usize },

    #[error("Dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Column '{0}' is missing from the model frame")]
    MissingColumn(String),

    #[error("Column '{0}' still contains nulls after row filtering")]
    UnexpectedNull(String),

    #[error("Linear system is singular")]
    SingularMatrix,

    #[error("Invalid SARIMAX order {0}: seasonal terms need a period of at least 2")]
    InvalidOrder(String),

    #[error("SARIMAX fit for order {order} produced a non-finite likelihood")]
    NonFiniteFit { order: String },

    #[error("No SARIMAX order in the grid could be fitted")]
    NoViableOrder,

    #[error("Failed to read model file '{0}'")]
    ModelRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write model file '{0}'")]
    ModelWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode model")]
    ModelEncode(#[source] Box<bincode::error::EncodeError>),

    #[error("Failed to decode model from '{0}'")]
    ModelDecode(PathBuf, #[source] Box<bincode::error::DecodeError>),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
