//! # Series Math
//!
//! Numeric building blocks for the forecasting pipeline.
//! This crate provides the in-sample regression metrics reported after
//! training, a small dense ridge solver used to fit additive models, and the
//! fixed-precision rounding applied during normalization.

use thiserror::Error;

pub mod linalg;
pub mod metrics;
pub mod rounding;

pub use metrics::RegressionMetrics;
pub use rounding::round_to;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MathError::InsufficientData("need two points".to_string());
        assert_eq!(
            err.to_string(),
            "Insufficient data for calculation: need two points"
        );
    }
}
