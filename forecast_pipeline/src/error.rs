//! Error types for the forecast_pipeline crate

use polars::prelude::PolarsError;
use series_math::MathError;
use thiserror::Error;

/// Custom error types for the forecast_pipeline crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Malformed or contradictory parameters, unknown entities, missing columns
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A date string that does not follow the expected grammar
    #[error("Format error: {reason} (input: {input:?})")]
    FormatError { input: String, reason: String },

    /// A referenced artifact does not exist
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Remote failures and model fit/predict failures
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from HTTP requests
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from (de)serializing documents
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse error classes, one per response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Upstream,
}

impl ErrorKind {
    /// Response status for this class of failure
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Upstream => 500,
        }
    }
}

impl ForecastError {
    /// Build a format error carrying the offending input
    pub fn format(input: impl Into<String>, reason: impl Into<String>) -> Self {
        ForecastError::FormatError {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::ValidationError(_) | ForecastError::FormatError { .. } => {
                ErrorKind::Validation
            }
            ForecastError::NotFoundError(_) => ErrorKind::NotFound,
            ForecastError::UpstreamError(_)
            | ForecastError::IoError(_)
            | ForecastError::HttpError(_)
            | ForecastError::PolarsError(_)
            | ForecastError::SerializationError(_) => ErrorKind::Upstream,
        }
    }

    /// Shorthand for `self.kind().status_code()`
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<reqwest::Error> for ForecastError {
    fn from(err: reqwest::Error) -> Self {
        ForecastError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::UpstreamError(format!("CSV error: {}", err))
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::ValidationError(format!("Invalid configuration: {}", err))
    }
}

// Metric failures come from degenerate datasets, which the caller must fix.
impl From<MathError> for ForecastError {
    fn from(err: MathError) -> Self {
        ForecastError::ValidationError(err.to_string())
    }
}
