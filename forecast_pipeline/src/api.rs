//! Request/response handlers for training and prediction
//!
//! Transport-agnostic: a server layer deserializes the request bodies, calls
//! [`ForecastApi::handle_train`] or [`ForecastApi::handle_predict`] and sends
//! back `status` with the serialized response.

use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::ingest::{SeriesSource, StatisticsClient};
use crate::models::{AdditiveModel, TrainingOptions};
use crate::orchestrator::ForecastOrchestrator;
use crate::prediction::{PredictionMode, PredictionOutput, PredictionService};
use crate::resolver::DatasetResolver;
use crate::store::{ArtifactStore, FsArtifactStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_math::RegressionMetrics;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRequest {
    pub entity_id: String,
    /// `YYYY-MM-DD`
    pub start_date: String,
    /// `YYYY-MM-DD`, strictly after `start_date`
    pub cutoff_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainResponse {
    pub entity_id: String,
    pub metrics: RegressionMetrics,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub entity_id: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub batch: bool,
    /// Required when `batch` is set
    #[serde(default)]
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub entity_id: String,
    /// Empty for batch requests
    pub predictions: BTreeMap<String, f64>,
    pub message: String,
    pub output_path: Option<String>,
}

/// Failure body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Status code plus either the payload or an error body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self {
                status: 200,
                data: Some(data),
                error: None,
            },
            Err(e) => {
                let status = e.status_code();
                if status >= 500 {
                    error!(status, error = %e, "request failed");
                } else {
                    warn!(status, error = %e, "request rejected");
                }
                Self {
                    status,
                    data: None,
                    error: Some(ErrorBody {
                        detail: e.to_string(),
                    }),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Strict `YYYY-MM-DD`
pub fn parse_iso_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ForecastError::ValidationError(format!(
            "{} must be a YYYY-MM-DD date, got {:?}",
            field, value
        ))
    })
}

fn ordered_window(
    start_field: &str,
    start: &str,
    end_field: &str,
    end: &str,
) -> Result<(NaiveDate, NaiveDate)> {
    let start_date = parse_iso_date(start_field, start)?;
    let end_date = parse_iso_date(end_field, end)?;
    if start_date >= end_date {
        return Err(ForecastError::ValidationError(format!(
            "{} ({}) must be before {} ({})",
            start_field, start_date, end_field, end_date
        )));
    }
    Ok((start_date, end_date))
}

/// Training and prediction entry points over one configuration
#[derive(Debug)]
pub struct ForecastApi<S, A> {
    resolver: DatasetResolver<S>,
    store: A,
    options: TrainingOptions,
}

impl ForecastApi<StatisticsClient, FsArtifactStore> {
    /// Live statistics API and the configured model directory
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let client = StatisticsClient::new(&config.api)?;
        let store = FsArtifactStore::open(&config.paths.model_dir)?;
        Ok(Self::new(config, client, store))
    }
}

impl<S: SeriesSource, A: ArtifactStore> ForecastApi<S, A> {
    pub fn new(config: &PipelineConfig, series_source: S, store: A) -> Self {
        Self {
            resolver: DatasetResolver::new(config, series_source),
            store,
            options: TrainingOptions::from_config(&config.training),
        }
    }

    pub fn resolver(&self) -> &DatasetResolver<S> {
        &self.resolver
    }

    pub fn store(&self) -> &A {
        &self.store
    }

    pub fn handle_train(&self, request: &TrainRequest) -> ApiResponse<TrainResponse> {
        info!(entity = %request.entity_id, "train request");
        ApiResponse::from_result(self.train(request))
    }

    pub fn handle_predict(&self, request: &PredictRequest) -> ApiResponse<PredictResponse> {
        info!(entity = %request.entity_id, batch = request.batch, "predict request");
        ApiResponse::from_result(self.predict(request))
    }

    fn train(&self, request: &TrainRequest) -> Result<TrainResponse> {
        let (start, cutoff) = ordered_window(
            "start_date",
            &request.start_date,
            "cutoff_date",
            &request.cutoff_date,
        )?;

        let dataset = self.resolver.resolve(&request.entity_id, start, cutoff)?;
        let outcome =
            ForecastOrchestrator::<_, AdditiveModel>::new(&self.store).train(&dataset, &self.options)?;

        Ok(TrainResponse {
            entity_id: outcome.entity_id.clone(),
            metrics: outcome.metrics,
            message: format!(
                "Model for {} trained on {} observations",
                outcome.entity_id, outcome.observations
            ),
        })
    }

    fn predict(&self, request: &PredictRequest) -> Result<PredictResponse> {
        let (start, end) = ordered_window(
            "start_date",
            &request.start_date,
            "end_date",
            &request.end_date,
        )?;

        let mode = if request.batch {
            match request.output_dir.as_deref().map(str::trim) {
                Some(dir) if !dir.is_empty() => PredictionMode::Batch {
                    output_dir: PathBuf::from(dir),
                },
                _ => {
                    return Err(ForecastError::ValidationError(
                        "output_dir is required for batch predictions".to_string(),
                    ))
                }
            }
        } else {
            PredictionMode::Inline
        };

        let service = PredictionService::<_, AdditiveModel>::new(&self.store);
        let response = match service.predict(&request.entity_id, start, end, &mode)? {
            PredictionOutput::Inline(predictions) => PredictResponse {
                entity_id: request.entity_id.clone(),
                message: format!("{} predictions generated", predictions.len()),
                predictions,
                output_path: None,
            },
            PredictionOutput::Batch { path, rows } => PredictResponse {
                entity_id: request.entity_id.clone(),
                predictions: BTreeMap::new(),
                message: format!("{} predictions written", rows),
                output_path: Some(path.display().to_string()),
            },
        };

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iso_date_is_strict() {
        assert!(parse_iso_date("start_date", "2020-01-01").is_ok());
        assert!(parse_iso_date("start_date", "01/01/2020").is_err());
        assert!(parse_iso_date("start_date", "2020-13-01").is_err());
    }

    #[test]
    fn test_window_must_be_increasing() {
        let err = ordered_window("start_date", "2020-12-31", "cutoff_date", "2020-01-01")
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(ordered_window("start_date", "2020-01-01", "cutoff_date", "2020-01-01").is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let response: ApiResponse<TrainResponse> =
            ApiResponse::from_result(Err(ForecastError::NotFoundError("AAPL".to_string())));
        assert_eq!(response.status, 404);
        assert!(!response.is_success());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], 404);
        assert!(json.get("data").is_none());
        assert_eq!(json["error"]["detail"], "Not found: AAPL");
    }
}
