//! Additive trend + seasonality model
//!
//! `y(t) = k + m·t + Σ δⱼ·(t - cⱼ)₊ + Σ Fourier terms`
//!
//! Time is scaled to `[0, 1]` over the training history and the target by its
//! largest magnitude. Changepoints sit evenly over the first 80% of the
//! history; their coefficients and the seasonal ones are shrunk with a ridge
//! penalty, the intercept and base slope are not.

use crate::data::Dataset;
use crate::error::{ForecastError, Result};
use crate::models::{
    ForecastModel, ForecastResult, ForecastRow, SeasonalityFlags, TrainedForecastModel,
    TrainingOptions,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_math::linalg::solve_ridge;
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

const MAX_CHANGEPOINTS: usize = 25;
const CHANGEPOINT_RANGE: f64 = 0.8;
const SEASONALITY_PENALTY: f64 = 0.1;

/// A Fourier seasonality: period in days and number of harmonics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub period_days: f64,
    pub order: usize,
}

impl Seasonality {
    pub const YEARLY: Seasonality = Seasonality {
        period_days: 365.25,
        order: 10,
    };
    pub const WEEKLY: Seasonality = Seasonality {
        period_days: 7.0,
        order: 3,
    };
    pub const DAILY: Seasonality = Seasonality {
        period_days: 1.0,
        order: 4,
    };

    fn enabled(flags: SeasonalityFlags) -> Vec<Seasonality> {
        let mut out = Vec::new();
        if flags.yearly {
            out.push(Self::YEARLY);
        }
        if flags.weekly {
            out.push(Self::WEEKLY);
        }
        if flags.daily {
            out.push(Self::DAILY);
        }
        out
    }
}

/// Maps a date to a design-matrix row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FeatureLayout {
    origin: NaiveDate,
    span_days: f64,
    /// Changepoint locations in scaled time
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
}

impl FeatureLayout {
    fn new(dates: &[NaiveDate], seasonalities: Vec<Seasonality>) -> Self {
        let origin = dates[0];
        let last = dates[dates.len() - 1];
        let span_days = ((last - origin).num_days() as f64).max(1.0);

        let mut layout = Self {
            origin,
            span_days,
            changepoints: Vec::new(),
            seasonalities,
        };

        // Evenly spaced history indices within the changepoint range, excluding the first
        let hist_size = (dates.len() as f64 * CHANGEPOINT_RANGE).floor() as usize;
        let count = MAX_CHANGEPOINTS.min(hist_size.saturating_sub(1));
        if count > 0 {
            let step = (hist_size - 1) as f64 / count as f64;
            layout.changepoints = (1..=count)
                .map(|i| {
                    let idx = (i as f64 * step).round() as usize;
                    layout.scaled_time(dates[idx])
                })
                .collect();
            layout.changepoints.dedup();
        }

        layout
    }

    fn days(&self, date: NaiveDate) -> f64 {
        (date - self.origin).num_days() as f64
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        self.days(date) / self.span_days
    }

    fn width(&self) -> usize {
        2 + self.changepoints.len() + self.seasonalities.iter().map(|s| 2 * s.order).sum::<usize>()
    }

    fn penalties(&self, changepoint_prior_scale: f64) -> Vec<f64> {
        let mut penalties = vec![0.0, 0.0];
        penalties.resize(2 + self.changepoints.len(), 1.0 / changepoint_prior_scale);
        penalties.resize(self.width(), SEASONALITY_PENALTY);
        penalties
    }

    fn row(&self, date: NaiveDate) -> Vec<f64> {
        let t = self.scaled_time(date);
        let days = self.days(date);

        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|&c| (t - c).max(0.0)));

        for season in &self.seasonalities {
            for k in 1..=season.order {
                let angle = 2.0 * PI * k as f64 * days / season.period_days;
                row.push(angle.sin());
                row.push(angle.cos());
            }
        }

        row
    }
}

/// Untrained additive model
#[derive(Debug, Clone)]
pub struct AdditiveModel {
    name: String,
    options: TrainingOptions,
}

/// Fitted additive model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedAdditiveModel {
    name: String,
    layout: FeatureLayout,
    coefficients: Vec<f64>,
    y_scale: f64,
    last_date: NaiveDate,
    n_obs: usize,
    residual_std: f64,
    z_score: f64,
}

impl AdditiveModel {
    pub fn new(options: TrainingOptions) -> Result<Self> {
        options.validate()?;
        let flags = options.seasonality;
        Ok(Self {
            name: format!(
                "Additive (yearly={}, weekly={}, daily={}, cps={})",
                flags.yearly, flags.weekly, flags.daily, options.changepoint_prior_scale
            ),
            options,
        })
    }

    pub fn options(&self) -> &TrainingOptions {
        &self.options
    }
}

impl ForecastModel for AdditiveModel {
    type Trained = TrainedAdditiveModel;

    fn from_options(options: &TrainingOptions) -> Result<Self> {
        Self::new(*options)
    }

    fn train(&self, data: &Dataset) -> Result<Self::Trained> {
        if data.len() < 2 {
            return Err(ForecastError::UpstreamError(format!(
                "Cannot fit {}: need at least 2 observations, got {}",
                data.entity_id(),
                data.len()
            )));
        }

        let dates = data.timestamps();
        let values = data.values();

        let y_scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let targets: Vec<f64> = values.iter().map(|v| v / y_scale).collect();

        let layout = FeatureLayout::new(&dates, Seasonality::enabled(self.options.seasonality));
        let design: Vec<Vec<f64>> = dates.iter().map(|&d| layout.row(d)).collect();
        let penalties = layout.penalties(self.options.changepoint_prior_scale);

        let coefficients = solve_ridge(&design, &targets, &penalties).map_err(|e| {
            ForecastError::UpstreamError(format!("Fit failed for {}: {}", data.entity_id(), e))
        })?;

        let residuals: Vec<f64> = design
            .iter()
            .zip(values.iter())
            .map(|(row, actual)| actual - dot(row, &coefficients) * y_scale)
            .collect();
        let residual_std = population_std(&residuals);

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::UpstreamError(format!("Normal distribution: {}", e)))?;
        let z_score = normal.inverse_cdf(0.5 + self.options.interval_width / 2.0);

        Ok(TrainedAdditiveModel {
            name: self.name.clone(),
            layout,
            coefficients,
            y_scale,
            last_date: dates[dates.len() - 1],
            n_obs: dates.len(),
            residual_std,
            z_score,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl TrainedAdditiveModel {
    /// Standard deviation of the in-sample residuals
    pub fn residual_std(&self) -> f64 {
        self.residual_std
    }

    /// Last date of the training history
    pub fn last_date(&self) -> NaiveDate {
        self.last_date
    }
}

impl TrainedForecastModel for TrainedAdditiveModel {
    fn predict(&self, dates: &[NaiveDate]) -> Result<ForecastResult> {
        let rows = dates
            .iter()
            .map(|&date| {
                let yhat = dot(&self.layout.row(date), &self.coefficients) * self.y_scale;
                if !yhat.is_finite() {
                    return Err(ForecastError::UpstreamError(format!(
                        "Non-finite prediction for {}",
                        date
                    )));
                }

                // Bands widen with the distance past the training history
                let horizon = (date - self.last_date).num_days().max(0) as f64;
                let half_width = self.z_score
                    * self.residual_std
                    * (1.0 + horizon / self.n_obs as f64).sqrt();

                Ok(ForecastRow {
                    timestamp: date,
                    yhat,
                    yhat_lower: yhat - half_width,
                    yhat_upper: yhat + half_width,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        ForecastResult::new(rows)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn population_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
