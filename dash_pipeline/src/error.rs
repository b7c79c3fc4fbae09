//! Error types for the dash_pipeline crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the dash_pipeline crate
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The dataset source is unreachable or its content cannot be parsed
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// A valid filter matched no rows
    #[error("Empty selection: {0}")]
    EmptySelection(String),

    /// The forecasting window needs more rows than the series has
    #[error("Insufficient history: need {required} rows, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    /// Fewer entities than requested clusters
    #[error("Insufficient data: need at least {required} entities, have {available}")]
    InsufficientData { required: usize, available: usize },

    /// A field name that is not part of the loaded schema
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// A field used with an operation its kind does not support
    #[error("Field '{field}' must be {expected}")]
    FieldType { field: String, expected: String },

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error while writing delimited output
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error while reading or writing JSON configuration
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from the numeric kernels
    #[error("Math error: {0}")]
    MathError(#[from] dash_math::MathError),

    /// Error from the linfa scaling or clustering estimators
    #[error("Clustering error: {0}")]
    ClusteringError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<PolarsError> for PipelineError {
    fn from(err: PolarsError) -> Self {
        PipelineError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::CsvError(err.to_string())
    }
}

impl PipelineError {
    /// Whether the error must abort the whole run rather than one stage
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::DataUnavailable(_) | PipelineError::IoError(_)
        )
    }
}
