//! Requested date windows against the available history

use crate::data::Dataset;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Handling of window bounds that fall outside the dataset's span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    /// Move the bound to the nearest available timestamp and log it
    #[default]
    Clamp,
    /// Reject the request
    Strict,
}

impl FromStr for RangePolicy {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "clamp" => Ok(RangePolicy::Clamp),
            "strict" => Ok(RangePolicy::Strict),
            other => Err(ForecastError::ValidationError(format!(
                "Unknown range policy: {}",
                other
            ))),
        }
    }
}

/// Window actually applied to a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub start_clamped: bool,
    pub end_clamped: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RangeValidator {
    policy: RangePolicy,
}

impl RangeValidator {
    pub fn new(policy: RangePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RangePolicy {
        self.policy
    }

    /// `start` after `end` is always invalid
    pub fn check_order(start: NaiveDate, end: NaiveDate) -> Result<()> {
        if start > end {
            return Err(ForecastError::ValidationError(format!(
                "Start date ({}) is after end date ({})",
                start, end
            )));
        }
        Ok(())
    }

    /// Resolve the window to apply to `dataset` under the configured policy
    pub fn effective_window(
        &self,
        dataset: &Dataset,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DateWindow> {
        Self::check_order(start, end)?;

        let (min, max) = dataset.span().ok_or_else(|| {
            ForecastError::ValidationError(format!(
                "No data available for {}",
                dataset.entity_id()
            ))
        })?;

        let mut window = DateWindow {
            start,
            end,
            start_clamped: false,
            end_clamped: false,
        };

        if start < min {
            match self.policy {
                RangePolicy::Strict => {
                    return Err(ForecastError::ValidationError(format!(
                        "Start date ({}) precedes the earliest available date ({}) for {}",
                        start,
                        min,
                        dataset.entity_id()
                    )))
                }
                RangePolicy::Clamp => {
                    warn!(
                        entity = dataset.entity_id(),
                        requested = %start,
                        clamped = %min,
                        "start date precedes available data, clamping"
                    );
                    window.start = min;
                    window.start_clamped = true;
                }
            }
        }

        if end > max {
            match self.policy {
                RangePolicy::Strict => {
                    return Err(ForecastError::ValidationError(format!(
                        "End date ({}) is after the latest available date ({}) for {}",
                        end,
                        max,
                        dataset.entity_id()
                    )))
                }
                RangePolicy::Clamp => {
                    warn!(
                        entity = dataset.entity_id(),
                        requested = %end,
                        clamped = %max,
                        "end date exceeds available data, clamping"
                    );
                    window.end = max;
                    window.end_clamped = true;
                }
            }
        }

        Ok(window)
    }

    /// Filter `dataset` to the effective window; an empty result is rejected
    pub fn apply(&self, dataset: &Dataset, start: NaiveDate, end: NaiveDate) -> Result<Dataset> {
        let window = self.effective_window(dataset, start, end)?;
        let filtered = dataset.filter_window(window.start, window.end);

        if filtered.is_empty() {
            return Err(ForecastError::ValidationError(format!(
                "No data for {} between {} and {}",
                dataset.entity_id(),
                window.start,
                window.end
            )));
        }

        Ok(filtered)
    }
}
