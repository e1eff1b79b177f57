//! Central-bank date grammars and value normalization
//!
//! The statistics API labels periods with Spanish month codes in two grammars:
//!
//! - monthly: `"Mar.2023"`, with `"Mar23"` accepted as a fallback
//! - daily: `"05 Mar.25"` (also `"05.Mar.25"`), fixed-width positional fields
//!
//! Month codes are mapped to English through the configured [`MonthTable`]
//! and the rebuilt string is handed to chrono's parser.

use crate::config::{MonthTable, PipelineConfig};
use crate::data::{Dataset, NormalizedPoint};
use crate::error::{ForecastError, Result};
use crate::ingest::RawPoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use series_math::round_to;
use std::str::FromStr;

/// Decimal places kept after normalization
pub const VALUE_DECIMALS: u32 = 6;

/// Text grammar of a period label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGrammar {
    Monthly,
    Daily,
}

impl FromStr for DateGrammar {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "monthly" | "mensual" => Ok(DateGrammar::Monthly),
            "daily" | "diaria" => Ok(DateGrammar::Daily),
            other => Err(ForecastError::ValidationError(format!(
                "Unknown date grammar: {}",
                other
            ))),
        }
    }
}

/// Parses period labels and normalizes raw values
#[derive(Debug, Clone)]
pub struct DateNormalizer {
    months: MonthTable,
}

impl DateNormalizer {
    pub fn new(months: MonthTable) -> Self {
        Self { months }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.months.clone())
    }

    fn english_month<'a>(&'a self, code: &str, input: &str) -> Result<&'a str> {
        self.months
            .english(code)
            .ok_or_else(|| ForecastError::format(input, format!("unknown month code {:?}", code)))
    }

    /// Parse a period label in the given grammar
    pub fn parse(&self, input: &str, grammar: DateGrammar) -> Result<NaiveDate> {
        match grammar {
            DateGrammar::Monthly => self.parse_monthly(input),
            DateGrammar::Daily => self.parse_daily(input),
        }
    }

    /// `"Mmm.yyyy"` to the first day of that month, falling back to `"Mmmyy"`
    pub fn parse_monthly(&self, input: &str) -> Result<NaiveDate> {
        let chars: Vec<char> = input.trim().chars().collect();
        if chars.len() < 3 {
            return Err(ForecastError::format(input, "monthly period is too short"));
        }

        let code: String = chars[..3].iter().collect();
        let english = self.english_month(&code, input)?;
        let rest: String = chars[3..].iter().collect();

        if let Some(year) = rest.strip_prefix('.') {
            if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
                return NaiveDate::parse_from_str(&format!("01 {} {}", english, year), "%d %b %Y")
                    .map_err(|e| ForecastError::format(input, e.to_string()));
            }
        }

        if rest.len() == 2 && rest.chars().all(|c| c.is_ascii_digit()) {
            return NaiveDate::parse_from_str(&format!("01 {} {}", english, rest), "%d %b %y")
                .map_err(|e| ForecastError::format(input, e.to_string()));
        }

        Err(ForecastError::format(
            input,
            "expected Mmm.yyyy or Mmmyy",
        ))
    }

    /// `"dd Mmm.yy"`: day = chars 0..2, month code = chars 3..6, year = chars 7..
    pub fn parse_daily(&self, input: &str) -> Result<NaiveDate> {
        let chars: Vec<char> = input.trim().chars().collect();
        if chars.len() < 8 {
            return Err(ForecastError::format(input, "daily period is too short"));
        }

        let day: String = chars[0..2].iter().collect();
        let code: String = chars[3..6].iter().collect();
        let year: String = chars[7..].iter().collect();

        let english = self.english_month(&code, input)?;

        if !day.chars().all(|c| c.is_ascii_digit()) {
            return Err(ForecastError::format(input, "day must be two digits"));
        }
        if year.len() != 2 || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(ForecastError::format(input, "year must be two digits"));
        }

        NaiveDate::parse_from_str(&format!("{} {} {}", day, english, year), "%d %b %y")
            .map_err(|e| ForecastError::format(input, e.to_string()))
    }

    /// Convert a whole raw series into a dataset.
    ///
    /// Every period must parse and every value must be numeric; a single bad
    /// value rejects the series.
    pub fn normalize(
        &self,
        entity_id: &str,
        raw: &[RawPoint],
        grammar: DateGrammar,
        percent_encoded: bool,
    ) -> Result<Dataset> {
        let mut points = Vec::with_capacity(raw.len());
        let mut invalid = Vec::new();

        for point in raw {
            let timestamp = self.parse(&point.period, grammar)?;
            let value = normalize_value(&point.value, percent_encoded);
            if value.is_nan() {
                invalid.push(point.value.as_str());
            }
            points.push(NormalizedPoint { timestamp, value });
        }

        if let Some(first) = invalid.first() {
            return Err(ForecastError::ValidationError(format!(
                "{} non-numeric value(s) in series {}, first: {:?}",
                invalid.len(),
                entity_id,
                first
            )));
        }

        Dataset::new(entity_id, points)
    }

    /// Normalize an already normalized dataset again; values keep their scale
    /// and rounding is stable, so the result equals the input.
    pub fn renormalize(&self, dataset: &Dataset) -> Result<Dataset> {
        let points = dataset
            .points()
            .iter()
            .map(|p| NormalizedPoint {
                timestamp: p.timestamp,
                value: round_to(p.value, VALUE_DECIMALS),
            })
            .collect();
        Dataset::new(dataset.entity_id(), points)
    }
}

/// Parse a raw value, divide by 100 when percent-encoded, round to 6 places.
///
/// Anything that is not a finite number becomes `NaN`.
pub fn normalize_value(raw: &str, percent_encoded: bool) -> f64 {
    let value = match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => return f64::NAN,
    };

    let scaled = if percent_encoded { value / 100.0 } else { value };
    round_to(scaled, VALUE_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> DateNormalizer {
        DateNormalizer::new(MonthTable::default())
    }

    #[test]
    fn test_monthly_primary_and_fallback() {
        let n = normalizer();
        assert_eq!(
            n.parse_monthly("Mar.2023").unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()
        );
        assert_eq!(
            n.parse_monthly("Dic23").unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 1).unwrap()
        );
    }

    #[test]
    fn test_daily_with_dot_separator() {
        assert_eq!(
            normalizer().parse_daily("06.Mar.25").unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 6).unwrap()
        );
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("-10.9709", true), -0.109709);
        assert_eq!(normalize_value("3.563", false), 3.563);
        assert!(normalize_value("n.d.", false).is_nan());
        assert!(normalize_value("inf", false).is_nan());
    }

    #[test]
    fn test_grammar_from_str() {
        assert_eq!("Daily".parse::<DateGrammar>().unwrap(), DateGrammar::Daily);
        assert!("weekly".parse::<DateGrammar>().is_err());
    }
}
