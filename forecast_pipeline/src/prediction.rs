//! Predictions from stored artifacts
//!
//! A request covers every calendar day in `[start, end]`. Results are either
//! returned inline (date → point estimate, 2 decimals) or written as a Parquet
//! file holding all four forecast columns.

use crate::error::{ForecastError, Result};
use crate::models::{ForecastModel, ForecastResult, TrainedForecastModel};
use crate::store::{entity_file_key, ArtifactStore};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use series_math::round_to;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::info;

/// Decimal places of inline point estimates
pub const INLINE_DECIMALS: u32 = 2;

/// How results are delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionMode {
    Inline,
    /// Write a Parquet file under `output_dir`
    Batch { output_dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutput {
    /// `YYYY-MM-DD` → point estimate, in date order
    Inline(BTreeMap<String, f64>),
    Batch { path: PathBuf, rows: usize },
}

/// Every day from `start` to `end`, both included
pub fn daily_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Inline representation of a forecast
pub fn inline_predictions(result: &ForecastResult) -> BTreeMap<String, f64> {
    result
        .rows()
        .iter()
        .map(|row| {
            (
                row.timestamp.format("%Y-%m-%d").to_string(),
                round_to(row.yhat, INLINE_DECIMALS),
            )
        })
        .collect()
}

/// `predicciones_{entity}_{start}_{end}_{generated_at}.parquet`, with the
/// entity encoded by [`entity_file_key`] so the name stays inside its directory
pub fn batch_file_name(
    entity_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    generated_at: DateTime<Utc>,
) -> String {
    format!(
        "predicciones_{}_{}_{}_{}.parquet",
        entity_file_key(entity_id),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
        generated_at.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// Write the full forecast to `output_dir`, creating it if needed
pub fn write_batch(
    result: &ForecastResult,
    output_dir: &Path,
    file_name: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(file_name);

    let mut df = result.to_dataframe()?;
    let mut file = File::create(&path)?;
    ParquetWriter::new(&mut file).finish(&mut df)?;

    Ok(path)
}

/// Loads artifacts of model type `M` and predicts with them
#[derive(Debug)]
pub struct PredictionService<'a, A: ?Sized, M> {
    store: &'a A,
    model: PhantomData<M>,
}

impl<'a, A, M> PredictionService<'a, A, M>
where
    A: ArtifactStore + ?Sized,
    M: ForecastModel,
{
    pub fn new(store: &'a A) -> Self {
        Self {
            store,
            model: PhantomData,
        }
    }

    /// Full forecast for every day in `[start, end]`
    pub fn forecast(&self, entity_id: &str, start: NaiveDate, end: NaiveDate) -> Result<ForecastResult> {
        if start >= end {
            return Err(ForecastError::ValidationError(format!(
                "Start date ({}) must be before end date ({})",
                start, end
            )));
        }

        let artifact = self.store.get(entity_id)?;
        let trained: M::Trained = serde_json::from_slice(&artifact.model).map_err(|e| {
            ForecastError::UpstreamError(format!("Corrupt model for {}: {}", entity_id, e))
        })?;

        let dates = daily_range(start, end);
        trained.predict(&dates).map_err(|e| match e {
            upstream @ ForecastError::UpstreamError(_) => upstream,
            other => ForecastError::UpstreamError(format!(
                "Prediction failed for {}: {}",
                entity_id, other
            )),
        })
    }

    /// Forecast and deliver in the requested mode
    pub fn predict(
        &self,
        entity_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        mode: &PredictionMode,
    ) -> Result<PredictionOutput> {
        let result = self.forecast(entity_id, start, end)?;

        match mode {
            PredictionMode::Inline => {
                info!(entity = entity_id, rows = result.len(), "inline prediction");
                Ok(PredictionOutput::Inline(inline_predictions(&result)))
            }
            PredictionMode::Batch { output_dir } => {
                let name = batch_file_name(entity_id, start, end, Utc::now());
                let path = write_batch(&result, output_dir, &name)?;
                info!(
                    entity = entity_id,
                    rows = result.len(),
                    path = %path.display(),
                    "prediction written"
                );
                Ok(PredictionOutput::Batch {
                    path,
                    rows: result.len(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ForecastRow;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_range_is_inclusive() {
        let days = daily_range(date(2024, 2, 27), date(2024, 3, 2));
        assert_eq!(days.len(), 5);
        assert_eq!(days[2], date(2024, 2, 29));
        assert_eq!(days[4], date(2024, 3, 2));
    }

    #[test]
    fn test_inline_rounding_and_keys() {
        let result = ForecastResult::new(vec![ForecastRow {
            timestamp: date(2024, 1, 5),
            yhat: 101.23456,
            yhat_lower: 99.0,
            yhat_upper: 103.0,
        }])
        .unwrap();

        let inline = inline_predictions(&result);
        assert_eq!(inline.get("2024-01-05"), Some(&101.23));
    }

    #[test]
    fn test_batch_file_name() {
        let generated = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(
            batch_file_name("AAPL", date(2024, 1, 1), date(2024, 1, 31), generated),
            "predicciones_AAPL_2024-01-01_2024-01-31_2024-05-06_07-08-09.parquet"
        );
    }

    #[test]
    fn test_batch_file_name_stays_in_directory() {
        let generated = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let name = batch_file_name("../funds/PRIMA", date(2024, 1, 1), date(2024, 1, 31), generated);

        assert!(!name.contains('/'));
        assert!(name.starts_with("predicciones_%2E%2E%2Ffunds%2FPRIMA_2024-01-01_"));
        assert_eq!(
            Path::new("out").join(&name).parent(),
            Some(Path::new("out"))
        );
    }
}
