//! # Series Forecast
//!
//! Workspace facade re-exporting the pipeline and its numeric helpers.
//!
//! - [`pipeline`]: ingestion, normalization, training and prediction
//! - [`math`]: regression metrics, ridge solver and rounding
//!
//! ## Example
//!
//! ```
//! use series_forecast_workspace::pipeline::ingest::RawPoint;
//! use series_forecast_workspace::pipeline::{DateGrammar, DateNormalizer, PipelineConfig};
//!
//! let normalizer = DateNormalizer::from_config(&PipelineConfig::default());
//! let raw = vec![
//!     RawPoint::new("Mar.2023", "-10.9709"),
//!     RawPoint::new("Abr.2023", "-8.1139"),
//! ];
//!
//! let dataset = normalizer
//!     .normalize("AFP", &raw, DateGrammar::Monthly, true)
//!     .unwrap();
//! assert_eq!(dataset.values(), vec![-0.109709, -0.081139]);
//! ```

pub use forecast_pipeline as pipeline;
pub use series_math as math;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let metrics = math::RegressionMetrics::evaluate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(metrics.mse, 0.0);
        assert_eq!(pipeline::PipelineConfig::default().sources.index_id, "S&P500");
    }
}
