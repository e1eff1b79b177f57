//! Pipeline configuration
//!
//! A single [`PipelineConfig`] value is built once (defaults, a TOML file, or
//! environment overrides) and passed explicitly to every component. Nothing in
//! the crate reads paths or URLs from globals.
//!
//! ```toml
//! [paths]
//! model_dir = "models"
//! equities_path = "data/raw/stocks.csv"
//!
//! [sources.api_series.AFP]
//! code = "PN01178MM/json"
//! grammar = "monthly"
//! percent_encoded = true
//!
//! [training]
//! range_policy = "strict"
//! ```

use crate::error::{ForecastError, Result};
use crate::normalize::DateGrammar;
use crate::range::RangePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// File system locations
    pub paths: PathsConfig,
    /// Entity routing and source layout
    pub sources: SourcesConfig,
    /// Remote endpoints
    pub api: ApiConfig,
    /// Model defaults and date-window policy
    pub training: TrainingConfig,
    /// Spanish month code (upper-case, 3 letters) to English abbreviation
    pub months: MonthTable,
}

/// File system locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one model blob and one metrics document per entity
    pub model_dir: PathBuf,
    /// Consolidated equities table (`Date`, `Symbol`, `Close`, ...)
    pub equities_path: PathBuf,
    /// Pre-cleaned composite index file
    pub index_path: PathBuf,
    /// Directory with one raw file per pension fund, named `{FUND}.csv`
    pub fund_dir: PathBuf,
    /// Default target for normalized series exports
    pub export_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            equities_path: PathBuf::from("data/raw/stocks.csv"),
            index_path: PathBuf::from("data/raw/sp500.csv"),
            fund_dir: PathBuf::from("data/raw/afp"),
            export_dir: PathBuf::from("data/processed"),
        }
    }
}

/// One statistics-API series exposed as an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSeriesConfig {
    /// Series code appended to the API base URL
    pub code: String,
    /// Grammar of the `period` strings
    pub grammar: DateGrammar,
    /// Whether values are percentages to be converted into proportions
    #[serde(default)]
    pub percent_encoded: bool,
}

/// Entity routing and the layout of each backing source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Reserved identifier of the composite index
    pub index_id: String,
    /// Date column of the index file
    pub index_date_column: String,
    /// Value column of the index file
    pub index_value_column: String,
    /// Reserved pension-fund identifiers
    pub pension_funds: Vec<String>,
    /// Entities backed by the statistics API, keyed by entity id
    pub api_series: BTreeMap<String, ApiSeriesConfig>,
    /// Date column of the equities table
    pub equity_date_column: String,
    /// Symbol column of the equities table
    pub equity_symbol_column: String,
    /// Closing price column of the equities table
    pub equity_close_column: String,
    /// Marker for a value the publisher did not report
    pub missing_sentinel: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        let mut api_series = BTreeMap::new();
        api_series.insert(
            "AFP".to_string(),
            ApiSeriesConfig {
                code: "PN01178MM/json".to_string(),
                grammar: DateGrammar::Monthly,
                percent_encoded: true,
            },
        );
        api_series.insert(
            "TC".to_string(),
            ApiSeriesConfig {
                code: "PD04639PD/json".to_string(),
                grammar: DateGrammar::Daily,
                percent_encoded: false,
            },
        );
        api_series.insert(
            "ORO".to_string(),
            ApiSeriesConfig {
                code: "PN01654XM/json".to_string(),
                grammar: DateGrammar::Monthly,
                percent_encoded: false,
            },
        );

        Self {
            index_id: "S&P500".to_string(),
            index_date_column: "Date".to_string(),
            index_value_column: "S&P500".to_string(),
            pension_funds: ["INTEGRA", "PRIMA", "HABITAT", "PROFUTURO"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            api_series,
            equity_date_column: "Date".to_string(),
            equity_symbol_column: "Symbol".to_string(),
            equity_close_column: "Close".to_string(),
            missing_sentinel: "n.d.".to_string(),
        }
    }
}

/// Remote endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the central-bank statistics API
    pub statistics_base_url: String,
    /// Base URL of the quote service
    pub quote_base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            statistics_base_url: "https://estadisticas.bcrp.gob.pe/estadisticas/series/api/"
                .to_string(),
            quote_base_url: "http://localhost:8081/quotes".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Model defaults and date-window policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub daily_seasonality: bool,
    /// Trend flexibility; larger values allow sharper trend changes
    pub changepoint_prior_scale: f64,
    /// Coverage of the lower/upper forecast bounds
    pub interval_width: f64,
    /// What to do with a requested window reaching past the data
    pub range_policy: RangePolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            yearly_seasonality: true,
            weekly_seasonality: true,
            daily_seasonality: false,
            changepoint_prior_scale: 0.05,
            interval_width: 0.80,
            range_policy: RangePolicy::Clamp,
        }
    }
}

/// Spanish to English month abbreviations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthTable(BTreeMap<String, String>);

impl MonthTable {
    /// English abbreviation for a Spanish code, case-insensitive
    pub fn english(&self, code: &str) -> Option<&str> {
        self.0.get(&code.to_uppercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for MonthTable {
    fn default() -> Self {
        let pairs = [
            ("ENE", "Jan"),
            ("FEB", "Feb"),
            ("MAR", "Mar"),
            ("ABR", "Apr"),
            ("MAY", "May"),
            ("JUN", "Jun"),
            ("JUL", "Jul"),
            ("AGO", "Aug"),
            ("SEP", "Sep"),
            ("OCT", "Oct"),
            ("NOV", "Nov"),
            ("DIC", "Dec"),
        ];
        Self(
            pairs
                .iter()
                .map(|(es, en)| (es.to_string(), en.to_string()))
                .collect(),
        )
    }
}

impl PipelineConfig {
    /// Parse a TOML document; missing sections fall back to defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Defaults (or the file named by `FORECAST_CONFIG`) with `FORECAST_*`
    /// environment overrides applied
    pub fn from_env() -> Result<Self> {
        let base = match std::env::var("FORECAST_CONFIG") {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Recognized keys: `FORECAST_MODEL_DIR`, `FORECAST_EQUITIES_PATH`,
    /// `FORECAST_INDEX_PATH`, `FORECAST_FUND_DIR`, `FORECAST_EXPORT_DIR`,
    /// `FORECAST_STATISTICS_URL`, `FORECAST_QUOTE_URL`,
    /// `FORECAST_RANGE_POLICY`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FORECAST_MODEL_DIR") {
            self.paths.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORECAST_EQUITIES_PATH") {
            self.paths.equities_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORECAST_INDEX_PATH") {
            self.paths.index_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORECAST_FUND_DIR") {
            self.paths.fund_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORECAST_EXPORT_DIR") {
            self.paths.export_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORECAST_STATISTICS_URL") {
            self.api.statistics_base_url = v;
        }
        if let Some(v) = lookup("FORECAST_QUOTE_URL") {
            self.api.quote_base_url = v;
        }
        if let Some(v) = lookup("FORECAST_RANGE_POLICY") {
            self.training.range_policy = v.parse()?;
        }
        Ok(self)
    }

    /// Rebase every relative path under `root`
    pub fn with_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        let root = root.as_ref();
        let rebase = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                root.join(p)
            }
        };
        self.paths = PathsConfig {
            model_dir: rebase(&self.paths.model_dir),
            equities_path: rebase(&self.paths.equities_path),
            index_path: rebase(&self.paths.index_path),
            fund_dir: rebase(&self.paths.fund_dir),
            export_dir: rebase(&self.paths.export_dir),
        };
        self
    }

    /// Raw file of a pension fund
    pub fn fund_path(&self, fund: &str) -> PathBuf {
        self.paths.fund_dir.join(format!("{}.csv", fund))
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.sources.index_id.trim().is_empty() {
            return Err(ForecastError::ValidationError(
                "sources.index_id must not be empty".to_string(),
            ));
        }

        if self.sources.pension_funds.iter().any(|f| f.trim().is_empty()) {
            return Err(ForecastError::ValidationError(
                "sources.pension_funds contains an empty identifier".to_string(),
            ));
        }

        if !(self.training.changepoint_prior_scale > 0.0) {
            return Err(ForecastError::ValidationError(format!(
                "training.changepoint_prior_scale must be positive, got {}",
                self.training.changepoint_prior_scale
            )));
        }

        if !(self.training.interval_width > 0.0 && self.training.interval_width < 1.0) {
            return Err(ForecastError::ValidationError(format!(
                "training.interval_width must be between 0 and 1, got {}",
                self.training.interval_width
            )));
        }

        if self.months.len() != 12 {
            return Err(ForecastError::ValidationError(format!(
                "months must map exactly 12 codes, got {}",
                self.months.len()
            )));
        }

        Ok(())
    }
}
