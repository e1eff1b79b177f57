//! Regression metrics for in-sample forecast evaluation
//!
//! All functions compare `actual` target values against `predicted` fitted
//! values of the same length.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

fn check_pair(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.is_empty() {
        return Err(MathError::InvalidInput(
            "Actual and predicted values must not be empty".to_string(),
        ));
    }

    if actual.len() != predicted.len() {
        return Err(MathError::InvalidInput(format!(
            "Actual length ({}) doesn't match predicted length ({})",
            actual.len(),
            predicted.len()
        )));
    }

    if let Some(bad) = actual
        .iter()
        .chain(predicted.iter())
        .find(|v| !v.is_finite())
    {
        return Err(MathError::InvalidInput(format!(
            "Non-finite value in metric input: {}",
            bad
        )));
    }

    Ok(())
}

/// Mean squared error
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_pair(actual, predicted)?;

    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    Ok(sum / actual.len() as f64)
}

/// Square root of the mean squared error
pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    Ok(mean_squared_error(actual, predicted)?.sqrt())
}

/// Mean absolute error
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_pair(actual, predicted)?;

    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum();

    Ok(sum / actual.len() as f64)
}

/// Coefficient of determination.
///
/// Undefined for a single observation or a constant target, both of which
/// are reported as [`MathError::InsufficientData`].
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_pair(actual, predicted)?;

    if actual.len() < 2 {
        return Err(MathError::InsufficientData(
            "R-squared needs at least 2 observations".to_string(),
        ));
    }

    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    if ss_tot <= f64::EPSILON {
        return Err(MathError::InsufficientData(
            "R-squared is undefined for a constant target".to_string(),
        ));
    }

    Ok(1.0 - ss_res / ss_tot)
}

/// The four in-sample metrics reported for a trained model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Coefficient of determination
    pub r2: f64,
}

impl RegressionMetrics {
    /// Compute all metrics of `predicted` against `actual`
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        let mse = mean_squared_error(actual, predicted)?;

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae: mean_absolute_error(actual, predicted)?,
            r2: r2_score(actual, predicted)?,
        })
    }
}

impl std::fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "In-sample Metrics:")?;
        writeln!(f, "  MSE:   {:.4}", self.mse)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  R2:    {:.4}", self.r2)?;
        Ok(())
    }
}
