//! Training runs: fit, in-sample evaluation and persistence

use crate::data::Dataset;
use crate::error::{ForecastError, Result};
use crate::ingest::SeriesSource;
use crate::models::{ForecastModel, TrainedForecastModel, TrainingOptions};
use crate::resolver::DatasetResolver;
use crate::store::{ArtifactStore, TrainedArtifact};
use chrono::{DateTime, Utc};
use series_math::RegressionMetrics;
use std::fmt;
use std::marker::PhantomData;
use tracing::{error, info, warn};

/// Result of one successful training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub entity_id: String,
    pub metrics: RegressionMetrics,
    pub trained_at: DateTime<Utc>,
    /// Number of observations the model was fitted on
    pub observations: usize,
}

/// Summary of a bulk training run
#[derive(Debug, Clone, Default)]
pub struct BulkTrainingReport {
    pub trained: Vec<TrainingOutcome>,
    /// Entities that could not be trained, with the reason
    pub skipped: Vec<(String, String)>,
}

impl fmt::Display for BulkTrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Trained {} entities, skipped {}",
            self.trained.len(),
            self.skipped.len()
        )?;
        for outcome in &self.trained {
            writeln!(f, "  {:<12} {}", outcome.entity_id, outcome.metrics)?;
        }
        for (entity, reason) in &self.skipped {
            writeln!(f, "  {:<12} skipped: {}", entity, reason)?;
        }
        Ok(())
    }
}

/// Drives model fitting for a model type `M` and stores the results
#[derive(Debug)]
pub struct ForecastOrchestrator<'a, A: ?Sized, M> {
    store: &'a A,
    model: PhantomData<M>,
}

impl<'a, A, M> ForecastOrchestrator<'a, A, M>
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

    /// Fit over the whole dataset, evaluate in-sample and overwrite the
    /// entity's artifact
    pub fn train(&self, dataset: &Dataset, options: &TrainingOptions) -> Result<TrainingOutcome> {
        let entity_id = dataset.entity_id();

        if dataset.len() < 2 {
            return Err(ForecastError::ValidationError(format!(
                "Need at least 2 observations to train {}, got {}",
                entity_id,
                dataset.len()
            )));
        }

        let model = M::from_options(options)?;
        info!(
            entity = entity_id,
            model = model.name(),
            rows = dataset.len(),
            "training started"
        );

        // Any fit failure is an upstream failure, whatever the model reported
        let trained = model.train(dataset).map_err(|e| match e {
            upstream @ ForecastError::UpstreamError(_) => upstream,
            other => {
                ForecastError::UpstreamError(format!("Fit failed for {}: {}", entity_id, other))
            }
        })?;

        let fitted = trained.predict(&dataset.timestamps()).map_err(|e| {
            ForecastError::UpstreamError(format!(
                "In-sample prediction failed for {}: {}",
                entity_id, e
            ))
        })?;
        let metrics = RegressionMetrics::evaluate(&dataset.values(), &fitted.point_estimates())?;

        let artifact = TrainedArtifact {
            entity_id: entity_id.to_string(),
            model: serde_json::to_vec(&trained)?,
            metrics,
            trained_at: Utc::now(),
        };
        self.store.put(&artifact)?;

        info!(
            entity = entity_id,
            mse = metrics.mse,
            rmse = metrics.rmse,
            mae = metrics.mae,
            r2 = metrics.r2,
            "training finished"
        );

        Ok(TrainingOutcome {
            entity_id: artifact.entity_id,
            metrics,
            trained_at: artifact.trained_at,
            observations: dataset.len(),
        })
    }

    /// Train every entity the resolver knows over its full history.
    ///
    /// Failures are logged and reported, never fatal for the remaining
    /// entities.
    pub fn train_all<S: SeriesSource>(
        &self,
        resolver: &DatasetResolver<S>,
        options: &TrainingOptions,
    ) -> Result<BulkTrainingReport> {
        let entities = resolver.list_entities()?;
        info!(count = entities.len(), "bulk training started");

        let mut report = BulkTrainingReport::default();
        for entity in entities {
            let result = resolver.load(&entity).and_then(|dataset| {
                if dataset.is_empty() {
                    return Err(ForecastError::ValidationError(format!(
                        "No data available for {}",
                        entity
                    )));
                }
                self.train(&dataset, options)
            });

            match result {
                Ok(outcome) => report.trained.push(outcome),
                Err(e) => {
                    if e.status_code() == 500 {
                        error!(entity = %entity, error = %e, "training failed");
                    } else {
                        warn!(entity = %entity, error = %e, "entity skipped");
                    }
                    report.skipped.push((entity, e.to_string()));
                }
            }
        }

        info!(
            trained = report.trained.len(),
            skipped = report.skipped.len(),
            "bulk training finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdditiveModel;
    use crate::store::FsArtifactStore;
    use chrono::{Duration, NaiveDate};
    use tempfile::tempdir;

    fn dataset(len: i64) -> Dataset {
        let origin = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let dates = (0..len).map(|d| origin + Duration::days(d)).collect();
        let values = (0..len).map(|d| 100.0 + d as f64 + (d % 7) as f64).collect();
        Dataset::from_columns("AAPL", dates, values).unwrap()
    }

    #[test]
    fn test_train_persists_artifact() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let orchestrator = ForecastOrchestrator::<_, AdditiveModel>::new(&store);

        let outcome = orchestrator
            .train(&dataset(90), &TrainingOptions::default())
            .unwrap();

        assert_eq!(outcome.observations, 90);
        assert!(outcome.metrics.r2 > 0.9);
        assert!((outcome.metrics.rmse - outcome.metrics.mse.sqrt()).abs() < 1e-12);
        assert!(store.exists("AAPL"));
    }

    #[test]
    fn test_single_point_is_validation_error() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let orchestrator = ForecastOrchestrator::<_, AdditiveModel>::new(&store);

        let err = orchestrator
            .train(&dataset(1), &TrainingOptions::default())
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(!store.exists("AAPL"));
    }
}
