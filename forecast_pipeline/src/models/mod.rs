//! Forecasting models for normalized series
//!
//! The pipeline never looks inside a model: it fits one through
//! [`ForecastModel`], asks the fitted value for predictions through
//! [`TrainedForecastModel`] and stores it as serialized bytes.

use crate::config::TrainingConfig;
use crate::data::Dataset;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// One predicted day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub timestamp: NaiveDate,
    /// Point estimate
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// Forecast result, one row per requested timestamp in request order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForecastResult {
    rows: Vec<ForecastRow>,
}

impl ForecastResult {
    /// Create a new forecast result
    pub fn new(rows: Vec<ForecastRow>) -> Result<Self> {
        if let Some(row) = rows
            .iter()
            .find(|r| !(r.yhat_lower <= r.yhat && r.yhat <= r.yhat_upper))
        {
            return Err(ForecastError::UpstreamError(format!(
                "Inconsistent bounds on {}: {} <= {} <= {} does not hold",
                row.timestamp, row.yhat_lower, row.yhat, row.yhat_upper
            )));
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the point estimates
    pub fn point_estimates(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.yhat).collect()
    }

    /// Columnar view with `ds`, `yhat`, `yhat_lower` and `yhat_upper`
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let ds: Vec<NaiveDate> = self.rows.iter().map(|r| r.timestamp).collect();
        let yhat: Vec<f64> = self.point_estimates();
        let lower: Vec<f64> = self.rows.iter().map(|r| r.yhat_lower).collect();
        let upper: Vec<f64> = self.rows.iter().map(|r| r.yhat_upper).collect();

        Ok(df!(
            "ds" => ds,
            "yhat" => yhat,
            "yhat_lower" => lower,
            "yhat_upper" => upper
        )?)
    }
}

/// Which Fourier seasonalities to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalityFlags {
    pub yearly: bool,
    pub weekly: bool,
    pub daily: bool,
}

impl Default for SeasonalityFlags {
    fn default() -> Self {
        Self {
            yearly: true,
            weekly: true,
            daily: false,
        }
    }
}

/// Per-request model parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingOptions {
    pub seasonality: SeasonalityFlags,
    /// Trend flexibility
    pub changepoint_prior_scale: f64,
    /// Coverage of the uncertainty bounds, in (0, 1)
    pub interval_width: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self::from_config(&TrainingConfig::default())
    }
}

impl TrainingOptions {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            seasonality: SeasonalityFlags {
                yearly: config.yearly_seasonality,
                weekly: config.weekly_seasonality,
                daily: config.daily_seasonality,
            },
            changepoint_prior_scale: config.changepoint_prior_scale,
            interval_width: config.interval_width,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.changepoint_prior_scale > 0.0) || !self.changepoint_prior_scale.is_finite() {
            return Err(ForecastError::ValidationError(format!(
                "Changepoint prior scale must be positive, got {}",
                self.changepoint_prior_scale
            )));
        }

        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ForecastError::ValidationError(format!(
                "Interval width must be between 0 and 1, got {}",
                self.interval_width
            )));
        }

        Ok(())
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug + Serialize + DeserializeOwned {
    /// Predict the given dates, in the given order
    fn predict(&self, dates: &[NaiveDate]) -> Result<ForecastResult>;

    /// Name of the model
    fn name(&self) -> &str;
}

/// Forecast model that can be trained on a dataset
pub trait ForecastModel: Debug + Clone + Sized {
    /// The type of trained model produced
    type Trained: TrainedForecastModel;

    /// Build an untrained model from request parameters
    fn from_options(options: &TrainingOptions) -> Result<Self>;

    /// Train the model on the whole dataset
    fn train(&self, data: &Dataset) -> Result<Self::Trained>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

pub mod additive;

pub use additive::{AdditiveModel, TrainedAdditiveModel};
