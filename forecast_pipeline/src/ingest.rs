//! Raw retrieval from the statistics API and the quote service
//!
//! Nothing here interprets periods or values; callers get the strings exactly
//! as published.

use crate::config::ApiConfig;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// A `(period, value)` pair as delivered upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPoint {
    pub period: String,
    pub value: String,
}

impl RawPoint {
    pub fn new(period: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            value: value.into(),
        }
    }
}

/// Anything that can return a statistics series by code
pub trait SeriesSource {
    fn fetch_series(&self, code: &str) -> Result<Vec<RawPoint>>;
}

impl<S: SeriesSource + ?Sized> SeriesSource for &S {
    fn fetch_series(&self, code: &str) -> Result<Vec<RawPoint>> {
        (**self).fetch_series(code)
    }
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    periods: Vec<PeriodEntry>,
}

#[derive(Debug, Deserialize)]
struct PeriodEntry {
    name: String,
    values: Vec<String>,
}

/// Decode a statistics API body; only the first value of each period is kept
pub fn parse_series_response(body: &str) -> Result<Vec<RawPoint>> {
    let response: SeriesResponse = serde_json::from_str(body)?;

    response
        .periods
        .into_iter()
        .map(|entry| {
            let value = entry.values.into_iter().next().ok_or_else(|| {
                ForecastError::UpstreamError(format!("Period {} has no values", entry.name))
            })?;
            Ok(RawPoint {
                period: entry.name,
                value,
            })
        })
        .collect()
}

/// Decode a quote CSV body with `Date` and `Close` columns
pub fn parse_quote_csv(body: &str) -> Result<Vec<RawPoint>> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader.headers()?.clone();
    let date_idx = headers.iter().position(|h| h == "Date");
    let close_idx = headers.iter().position(|h| h == "Close");

    let (date_idx, close_idx) = match (date_idx, close_idx) {
        (Some(d), Some(c)) => (d, c),
        _ => {
            return Err(ForecastError::UpstreamError(format!(
                "Quote response lacks Date/Close columns: {:?}",
                headers
            )))
        }
    };

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        points.push(RawPoint {
            period: record.get(date_idx).unwrap_or_default().to_string(),
            value: record.get(close_idx).unwrap_or_default().to_string(),
        });
    }

    Ok(points)
}

fn http_client(config: &ApiConfig) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

fn get_text(http: &Client, url: &str) -> Result<String> {
    debug!(url = %url, "GET");
    let response = http.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(ForecastError::UpstreamError(format!(
            "GET {} returned {}",
            url, status
        )));
    }
    Ok(response.text()?)
}

/// Blocking client for the central-bank statistics API
#[derive(Debug, Clone)]
pub struct StatisticsClient {
    base_url: String,
    http: Client,
}

impl StatisticsClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.statistics_base_url.clone(),
            http: http_client(config)?,
        })
    }

    /// URL of one series: base URL followed by the series code
    pub fn series_url(&self, code: &str) -> String {
        format!("{}{}", self.base_url, code)
    }
}

impl SeriesSource for StatisticsClient {
    fn fetch_series(&self, code: &str) -> Result<Vec<RawPoint>> {
        let body = get_text(&self.http, &self.series_url(code))?;
        let points = parse_series_response(&body)?;
        debug!(code, periods = points.len(), "fetched statistics series");
        Ok(points)
    }
}

/// Blocking client for the daily quote service
#[derive(Debug, Clone)]
pub struct QuoteClient {
    base_url: String,
    http: Client,
}

impl QuoteClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.quote_base_url.trim_end_matches('/').to_string(),
            http: http_client(config)?,
        })
    }

    pub fn quote_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!("{}/{}.csv?start={}&end={}", self.base_url, symbol, start, end)
    }

    /// Daily closing prices of `symbol` between `start` and `end`
    pub fn fetch_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPoint>> {
        let body = get_text(&self.http, &self.quote_url(symbol, start, end))?;
        parse_quote_csv(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_parse_series_response() {
        let body = r#"{
            "config": {"title": "Sistema privado de pensiones", "series": []},
            "periods": [
                {"name": "Mar.2023", "values": ["-10.9709"]},
                {"name": "Abr.2023", "values": ["-8.1139", "ignored"]}
            ]
        }"#;

        let points = parse_series_response(body).unwrap();
        assert_eq!(
            points,
            vec![
                RawPoint::new("Mar.2023", "-10.9709"),
                RawPoint::new("Abr.2023", "-8.1139"),
            ]
        );
    }

    #[test]
    fn test_period_without_values() {
        let body = r#"{"periods": [{"name": "Mar.2023", "values": []}]}"#;
        let err = parse_series_response(body).unwrap_err();
        assert!(matches!(err, ForecastError::UpstreamError(_)));
    }

    #[test]
    fn test_malformed_body_is_upstream() {
        let err = parse_series_response("<html>busy</html>").unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_parse_quote_csv() {
        let body = "Date,Open,Close\n2024-01-02,10.0,10.5\n2024-01-03,10.5,\n";
        let points = parse_quote_csv(body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], RawPoint::new("2024-01-02", "10.5"));
        assert_eq!(points[1].value, "");
    }

    #[test]
    fn test_urls() {
        let config = ApiConfig::default();
        let stats = StatisticsClient::new(&config).unwrap();
        assert_eq!(
            stats.series_url("PN01178MM/json"),
            "https://estadisticas.bcrp.gob.pe/estadisticas/series/api/PN01178MM/json"
        );

        let quotes = QuoteClient::new(&ApiConfig {
            quote_base_url: "http://quotes.local/".to_string(),
            ..ApiConfig::default()
        })
        .unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(
            quotes.quote_url("AAPL", start, end),
            "http://quotes.local/AAPL.csv?start=2024-01-01&end=2024-02-01"
        );
    }

    /// Serve one canned HTTP response on a loopback port
    fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{}", addr), handle)
    }

    fn loopback_quotes(base_url: String) -> QuoteClient {
        QuoteClient {
            base_url,
            http: Client::builder().no_proxy().build().unwrap(),
        }
    }

    #[test]
    fn test_fetch_closes_over_http() {
        let (base_url, server) = serve_once(
            "200 OK",
            "Date,Open,Close\n2024-01-02,10.0,10.5\n2024-01-03,10.5,10.75\n",
        );
        let quotes = loopback_quotes(base_url);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();

        let points = quotes.fetch_closes("AAPL", start, end).unwrap();
        assert_eq!(
            points,
            vec![
                RawPoint::new("2024-01-02", "10.5"),
                RawPoint::new("2024-01-03", "10.75"),
            ]
        );

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /AAPL.csv?start=2024-01-01&end=2024-01-05 "));
    }

    #[test]
    fn test_error_status_is_upstream() {
        let (base_url, server) = serve_once("503 Service Unavailable", "busy");
        let quotes = loopback_quotes(base_url);
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let err = quotes.fetch_closes("AAPL", day, day).unwrap_err();
        match &err {
            ForecastError::UpstreamError(msg) => assert!(msg.contains("503"), "{}", msg),
            other => panic!("expected an upstream error, got {:?}", other),
        }
        assert_eq!(err.status_code(), 500);
        server.join().unwrap();
    }
}
