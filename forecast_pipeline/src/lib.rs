//! # Forecast Pipeline
//!
//! Ingestion, normalization and per-entity forecast orchestration.
//!
//! ## Features
//!
//! - Central-bank period grammars (`"Mar.2023"`, `"05 Mar.25"`) with Spanish month codes
//! - Entity routing over four sources: equities table, composite index file,
//!   pension-fund files and statistics-API series
//! - Clamp or strict handling of requested date windows
//! - One additive trend/seasonality model per entity with in-sample metrics
//! - Per-entity artifact store with serialized, atomic writes
//! - Inline or Parquet batch predictions over a daily calendar
//!
//! ## Quick Start
//!
//! ```no_run
//! use forecast_pipeline::api::{ForecastApi, PredictRequest, TrainRequest};
//! use forecast_pipeline::config::PipelineConfig;
//!
//! # fn main() -> forecast_pipeline::error::Result<()> {
//! let config = PipelineConfig::from_env()?;
//! let api = ForecastApi::from_config(&config)?;
//!
//! let trained = api.handle_train(&TrainRequest {
//!     entity_id: "AAPL".to_string(),
//!     start_date: "2020-01-01".to_string(),
//!     cutoff_date: "2023-12-31".to_string(),
//! });
//! println!("{} {:?}", trained.status, trained.data);
//!
//! let predicted = api.handle_predict(&PredictRequest {
//!     entity_id: "AAPL".to_string(),
//!     start_date: "2024-01-01".to_string(),
//!     end_date: "2024-01-31".to_string(),
//!     batch: false,
//!     output_dir: None,
//! });
//! println!("{:?}", predicted.data.map(|d| d.predictions));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod prediction;
pub mod range;
pub mod resolver;
pub mod store;

pub use config::PipelineConfig;
pub use data::{Dataset, NormalizedPoint};
pub use error::{ErrorKind, ForecastError, Result};
pub use models::{AdditiveModel, ForecastModel, ForecastResult, TrainedForecastModel, TrainingOptions};
pub use normalize::{DateGrammar, DateNormalizer};
pub use range::{RangePolicy, RangeValidator};
pub use resolver::{DatasetResolver, EntitySource};
pub use store::{ArtifactStore, FsArtifactStore, TrainedArtifact};
