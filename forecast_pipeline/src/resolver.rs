//! Entity routing and dataset loading
//!
//! An entity id resolves once to an [`EntitySource`], in this precedence:
//!
//! 1. the reserved composite-index id
//! 2. a reserved pension-fund id
//! 3. a configured statistics-API series
//! 4. anything else is an equity symbol in the consolidated table
//!
//! Each source is then loaded into a normalized [`Dataset`].
//!
//! Tabular sources drop rows whose date is empty or whose value is one of the
//! missing markers `NaN`, `NA`, `N/A`, `null` (any case) or an empty cell, as
//! well as values that parse to a non-finite number.
//!
//! Fund files are decoded as ISO-8859-1, one byte per char. Windows-1252 files
//! decode the same way except for bytes 0x80 to 0x9F, which come out as C1
//! control characters instead of typographic symbols. Only header text can
//! contain such bytes; periods and values are ASCII and columns are addressed
//! by position, so loading is unaffected.

use crate::config::{ApiSeriesConfig, PipelineConfig};
use crate::data::{Dataset, NormalizedPoint};
use crate::error::{ForecastError, Result};
use crate::ingest::{RawPoint, SeriesSource};
use crate::normalize::{DateGrammar, DateNormalizer};
use crate::range::RangeValidator;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::collections::BTreeSet;
use std::fs;
use std::num::ParseFloatError;
use std::path::Path;
use tracing::{debug, info};

/// Backing source of an entity
#[derive(Debug, Clone, PartialEq)]
pub enum EntitySource {
    /// The pre-cleaned composite index file
    CompositeIndex,
    /// A pension fund's raw monthly file
    PensionFund { fund: String },
    /// A series of the statistics API
    ApiSeries(ApiSeriesConfig),
    /// A symbol of the consolidated equities table
    Equity { symbol: String },
}

impl EntitySource {
    /// Route an entity id
    pub fn route(entity_id: &str, config: &PipelineConfig) -> Self {
        let sources = &config.sources;

        if entity_id == sources.index_id {
            return EntitySource::CompositeIndex;
        }

        if sources.pension_funds.iter().any(|f| f == entity_id) {
            return EntitySource::PensionFund {
                fund: entity_id.to_string(),
            };
        }

        if let Some(series) = sources.api_series.get(entity_id) {
            return EntitySource::ApiSeries(series.clone());
        }

        EntitySource::Equity {
            symbol: entity_id.to_string(),
        }
    }
}

/// Loads normalized datasets for entities
#[derive(Debug, Clone)]
pub struct DatasetResolver<S> {
    config: PipelineConfig,
    series_source: S,
    normalizer: DateNormalizer,
    validator: RangeValidator,
}

impl<S: SeriesSource> DatasetResolver<S> {
    pub fn new(config: &PipelineConfig, series_source: S) -> Self {
        Self {
            config: config.clone(),
            series_source,
            normalizer: DateNormalizer::from_config(config),
            validator: RangeValidator::new(config.training.range_policy),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full history of an entity
    pub fn load(&self, entity_id: &str) -> Result<Dataset> {
        let source = EntitySource::route(entity_id, &self.config);
        debug!(entity = entity_id, source = ?source, "routing entity");

        let dataset = match &source {
            EntitySource::CompositeIndex => self.load_index(entity_id)?,
            EntitySource::PensionFund { fund } => self.load_fund(fund)?,
            EntitySource::ApiSeries(series) => self.load_api_series(entity_id, series)?,
            EntitySource::Equity { symbol } => self.load_equity(symbol)?,
        };

        info!(entity = entity_id, rows = dataset.len(), "dataset loaded");
        Ok(dataset)
    }

    /// History of an entity restricted to `[start, end]` under the range policy
    pub fn resolve(&self, entity_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Dataset> {
        RangeValidator::check_order(start, end)?;
        let dataset = self.load(entity_id)?;
        self.validator.apply(&dataset, start, end)
    }

    /// Raw statistics series of an API-backed entity
    pub fn fetch_raw(&self, entity_id: &str) -> Result<Vec<RawPoint>> {
        match EntitySource::route(entity_id, &self.config) {
            EntitySource::ApiSeries(series) => self.series_source.fetch_series(&series.code),
            _ => Err(ForecastError::ValidationError(format!(
                "{} is not a statistics series",
                entity_id
            ))),
        }
    }

    /// Every addressable entity: equity symbols, the index, funds and API series
    pub fn list_entities(&self) -> Result<Vec<String>> {
        let sources = &self.config.sources;
        let mut entities = Vec::new();
        let mut seen = BTreeSet::new();

        let table = CsvTable::read(&self.config.paths.equities_path, false)?;
        let symbol_idx = table.column(&sources.equity_symbol_column)?;
        for record in &table.records {
            let symbol = record.get(symbol_idx).unwrap_or_default().trim();
            if !symbol.is_empty() && seen.insert(symbol.to_string()) {
                entities.push(symbol.to_string());
            }
        }

        for extra in std::iter::once(&sources.index_id)
            .chain(sources.pension_funds.iter())
            .chain(sources.api_series.keys())
        {
            if seen.insert(extra.clone()) {
                entities.push(extra.clone());
            }
        }

        Ok(entities)
    }

    fn load_index(&self, entity_id: &str) -> Result<Dataset> {
        let sources = &self.config.sources;
        let table = CsvTable::read(&self.config.paths.index_path, false)?;
        let date_idx = table.column(&sources.index_date_column)?;
        let value_idx = table.column(&sources.index_value_column)?;

        let mut points = Vec::with_capacity(table.records.len());
        let mut dropped = 0usize;
        for record in &table.records {
            let raw_date = record.get(date_idx).unwrap_or_default().trim();
            let raw_value = record.get(value_idx).unwrap_or_default();
            let parsed = parse_table_value(raw_value).map_err(|_| {
                ForecastError::ValidationError(format!(
                    "Non-numeric index value {:?} on {}",
                    raw_value, raw_date
                ))
            })?;
            let Some(value) = parsed.filter(|_| !raw_date.is_empty()) else {
                dropped += 1;
                continue;
            };
            points.push(NormalizedPoint {
                timestamp: parse_table_date(raw_date)?,
                value,
            });
        }

        if dropped > 0 {
            debug!(entity = entity_id, dropped, "dropped rows with missing date or value");
        }

        Dataset::new(entity_id, points)
    }

    fn load_fund(&self, fund: &str) -> Result<Dataset> {
        let table = CsvTable::read(&self.config.fund_path(fund), true)?;

        let raw: Vec<RawPoint> = table
            .records
            .iter()
            .map(|record| {
                RawPoint::new(
                    record.get(0).unwrap_or_default().trim(),
                    record.get(1).unwrap_or_default().trim(),
                )
            })
            .collect();
        let raw = self.drop_missing(raw);

        self.normalizer
            .normalize(fund, &raw, DateGrammar::Monthly, true)
    }

    fn load_api_series(&self, entity_id: &str, series: &ApiSeriesConfig) -> Result<Dataset> {
        let raw = self.series_source.fetch_series(&series.code)?;
        let raw = self.drop_missing(raw);
        self.normalizer
            .normalize(entity_id, &raw, series.grammar, series.percent_encoded)
    }

    fn load_equity(&self, symbol: &str) -> Result<Dataset> {
        let sources = &self.config.sources;
        let table = CsvTable::read(&self.config.paths.equities_path, false)?;
        let symbol_idx = table.column(&sources.equity_symbol_column)?;
        let date_idx = table.column(&sources.equity_date_column)?;
        let close_idx = table.column(&sources.equity_close_column)?;

        let rows: Vec<&StringRecord> = table
            .records
            .iter()
            .filter(|r| r.get(symbol_idx).map(str::trim) == Some(symbol))
            .collect();

        if rows.is_empty() {
            return Err(ForecastError::ValidationError(format!(
                "Symbol {} does not exist in the equities table",
                symbol
            )));
        }

        let mut points = Vec::with_capacity(rows.len());
        let mut dropped = 0usize;
        for record in rows {
            let raw_date = record.get(date_idx).unwrap_or_default().trim();
            let raw_close = record.get(close_idx).unwrap_or_default().trim();
            let parsed = parse_table_value(raw_close).map_err(|_| {
                ForecastError::ValidationError(format!(
                    "Non-numeric close {:?} for {} on {}",
                    raw_close, symbol, raw_date
                ))
            })?;
            let Some(value) = parsed.filter(|_| !raw_date.is_empty()) else {
                dropped += 1;
                continue;
            };
            points.push(NormalizedPoint {
                timestamp: parse_table_date(raw_date)?,
                value,
            });
        }

        if dropped > 0 {
            debug!(symbol, dropped, "dropped rows with missing date or close");
        }

        Dataset::new(symbol, points)
    }

    /// Drop rows whose value is empty or the publisher's missing marker
    fn drop_missing(&self, raw: Vec<RawPoint>) -> Vec<RawPoint> {
        let sentinel = self.config.sources.missing_sentinel.as_str();
        let before = raw.len();
        let kept: Vec<RawPoint> = raw
            .into_iter()
            .filter(|p| {
                let value = p.value.trim();
                !p.period.trim().is_empty()
                    && !value.is_empty()
                    && !value.eq_ignore_ascii_case(sentinel)
            })
            .collect();

        if kept.len() < before {
            debug!(dropped = before - kept.len(), "dropped missing values");
        }
        kept
    }
}

/// Parse the date column of a tabular source.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 and `YYYY-MM-DD HH:MM:SS` with an optional
/// offset; only the calendar date is kept.
pub fn parse_table_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.date());
    }

    Err(ForecastError::format(input, "expected an ISO date"))
}

/// Cell contents that tabular sources use for a missing number
const MISSING_MARKERS: [&str; 5] = ["", "nan", "na", "n/a", "null"];

/// Parse a numeric cell of a tabular source.
///
/// Missing markers (compared case-insensitively) and non-finite numbers yield
/// `Ok(None)`; any other non-numeric text is an error.
fn parse_table_value(raw: &str) -> std::result::Result<Option<f64>, ParseFloatError> {
    let trimmed = raw.trim();
    if MISSING_MARKERS
        .iter()
        .any(|marker| trimmed.eq_ignore_ascii_case(marker))
    {
        return Ok(None);
    }
    let value = trimmed.parse::<f64>()?;
    Ok(value.is_finite().then_some(value))
}

/// A whole CSV file held in memory
struct CsvTable {
    headers: StringRecord,
    records: Vec<StringRecord>,
}

impl CsvTable {
    /// Read `path`; `latin1` decodes single-byte text before parsing
    fn read(path: &Path, latin1: bool) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            ForecastError::UpstreamError(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let text = if latin1 {
            bytes.iter().map(|&b| char::from(b)).collect::<String>()
        } else {
            String::from_utf8(bytes).map_err(|e| {
                ForecastError::UpstreamError(format!(
                    "{} is not valid UTF-8: {}",
                    path.display(),
                    e
                ))
            })?
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = reader.headers()?.clone();
        let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { headers, records })
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| {
                ForecastError::ValidationError(format!(
                    "Missing required column {:?} (found {:?})",
                    name,
                    self.headers.iter().collect::<Vec<_>>()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_precedence() {
        let mut config = PipelineConfig::default();
        // An id configured both as fund and API series routes as a fund
        config.sources.api_series.insert(
            "PRIMA".to_string(),
            ApiSeriesConfig {
                code: "X".to_string(),
                grammar: DateGrammar::Monthly,
                percent_encoded: true,
            },
        );

        assert_eq!(
            EntitySource::route("S&P500", &config),
            EntitySource::CompositeIndex
        );
        assert_eq!(
            EntitySource::route("PRIMA", &config),
            EntitySource::PensionFund {
                fund: "PRIMA".to_string()
            }
        );
        assert!(matches!(
            EntitySource::route("TC", &config),
            EntitySource::ApiSeries(_)
        ));
        assert_eq!(
            EntitySource::route("AAPL", &config),
            EntitySource::Equity {
                symbol: "AAPL".to_string()
            }
        );
    }

    #[test]
    fn test_parse_table_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        assert_eq!(parse_table_date("2020-01-02").unwrap(), expected);
        assert_eq!(parse_table_date("2020-01-02T00:00:00Z").unwrap(), expected);
        assert_eq!(
            parse_table_date("2020-01-02 00:00:00-05:00").unwrap(),
            expected
        );
        assert_eq!(parse_table_date("2020-01-02 09:30:00").unwrap(), expected);
        assert!(matches!(
            parse_table_date("02/01/2020"),
            Err(ForecastError::FormatError { .. })
        ));
    }

    #[test]
    fn test_table_value_missing_markers() {
        for marker in ["", "  ", "NaN", "nan", "NA", "N/A", "null", "NULL", "inf", "-inf"] {
            assert_eq!(parse_table_value(marker), Ok(None), "marker {:?}", marker);
        }
        assert_eq!(parse_table_value(" 101.5 "), Ok(Some(101.5)));
        assert!(parse_table_value("n.d.").is_err());
        assert!(parse_table_value("twelve").is_err());
    }
}
