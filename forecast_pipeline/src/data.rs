//! Canonical per-entity time series

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

/// One observation on the canonical timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub timestamp: NaiveDate,
    pub value: f64,
}

/// Ordered observations of one entity.
///
/// Timestamps are unique and strictly increasing; values are finite.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    entity_id: String,
    points: Vec<NormalizedPoint>,
}

impl Dataset {
    /// Sort points by timestamp; duplicated timestamps and non-finite values
    /// are rejected
    pub fn new(entity_id: impl Into<String>, mut points: Vec<NormalizedPoint>) -> Result<Self> {
        let entity_id = entity_id.into();

        if let Some(point) = points.iter().find(|p| !p.value.is_finite()) {
            return Err(ForecastError::ValidationError(format!(
                "Non-finite value {} on {} in series {}",
                point.value, point.timestamp, entity_id
            )));
        }

        points.sort_by_key(|p| p.timestamp);

        if let Some(pair) = points.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            return Err(ForecastError::ValidationError(format!(
                "Duplicate timestamp {} in series {}",
                pair[0].timestamp, entity_id
            )));
        }

        Ok(Self { entity_id, points })
    }

    /// Build from parallel date and value vectors (mostly for tests)
    pub fn from_columns(
        entity_id: impl Into<String>,
        dates: Vec<NaiveDate>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(ForecastError::ValidationError(format!(
                "Dates length ({}) doesn't match values length ({})",
                dates.len(),
                values.len()
            )));
        }

        let points = dates
            .into_iter()
            .zip(values)
            .map(|(timestamp, value)| NormalizedPoint { timestamp, value })
            .collect();
        Self::new(entity_id, points)
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The timestamps as a vector
    pub fn timestamps(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    /// The values as a vector
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Earliest and latest timestamp
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    /// Points with `start <= timestamp <= end`
    pub fn filter_window(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            entity_id: self.entity_id.clone(),
            points: self
                .points
                .iter()
                .filter(|p| p.timestamp >= start && p.timestamp <= end)
                .copied()
                .collect(),
        }
    }

    /// Write `timestamp,value` rows to a CSV file, creating parent directories
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_writer(File::create(path)?);
        writer.write_record(["timestamp", "value"])?;
        for point in &self.points {
            writer.write_record([point.timestamp.to_string(), point.value.to_string()])?;
        }
        writer.flush()?;

        Ok(())
    }
}

/// Export a normalized dataset as `timestamp,value` CSV
pub fn export_dataset_csv<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<()> {
    dataset.to_csv(path)
}
