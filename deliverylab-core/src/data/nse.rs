//! NSE price/volume/deliverable data provider.
//!
//! Fetches the security-wise historical CSV from NSE's `historicalOR`
//! endpoint. One GET per call: no retries, no session warm-up, no backoff.
//! NSE serves an HTML page instead of CSV when it refuses a client, which is
//! reported as a format change.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};

use super::provider::{DailyRecordProvider, DataError};
use crate::config::ProviderConfig;
use crate::domain::RawRecord;

const HISTORICAL_PATH: &str = "/api/historicalOR/generateSecurityWiseHistoricalData";

/// Columns a payload must carry to be usable at all.
const REQUIRED_COLUMNS: [&str; 2] = ["Series", "Date"];

/// Blocking NSE client.
pub struct NseProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl NseProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, DataError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/csv,application/json,*/*"));
        let referer = HeaderValue::from_str(&format!("{}/", config.base_url.trim_end_matches('/')))
            .map_err(|e| DataError::Other(format!("invalid base url for referer: {e}")))?;
        headers.insert(REFERER, referer);

        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the historical-data URL for a symbol and provider-formatted dates.
    fn historical_url(&self, symbol: &str, from: &str, to: &str) -> Result<reqwest::Url, DataError> {
        reqwest::Url::parse_with_params(
            &format!("{}{HISTORICAL_PATH}", self.base_url),
            &[
                ("from", from),
                ("to", to),
                ("symbol", symbol),
                ("type", "priceVolumeDeliverable"),
                ("series", "ALL"),
                ("csv", "true"),
            ],
        )
        .map_err(|e| DataError::Other(format!("invalid url: {e}")))
    }
}

impl DailyRecordProvider for NseProvider {
    fn name(&self) -> &str {
        "nse"
    }

    fn get_daily_records(
        &self,
        symbol: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<RawRecord>, DataError> {
        let url = self.historical_url(symbol, from, to)?;
        tracing::debug!(%url, "requesting NSE historical data");

        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }

        let body = resp.text().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to read body for {symbol}: {e}"))
        })?;

        parse_csv_payload(&body)
    }
}

/// Parse an NSE price-volume-deliverable CSV payload into raw rows.
///
/// Headers and cells are trimmed (NSE pads header names with spaces) and a
/// leading byte-order mark is ignored. An empty body yields no rows; a body
/// that is not CSV with the expected columns is a format change.
pub fn parse_csv_payload(body: &str) -> Result<Vec<RawRecord>, DataError> {
    let body = body.trim_start_matches('\u{feff}');
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    if body.trim_start().starts_with('<') {
        return Err(DataError::ResponseFormatChanged(
            "expected CSV, got an HTML page".into(),
        ));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| DataError::ResponseFormatChanged(format!("unreadable CSV header: {e}")))?
        .clone();
    for required in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == required) {
            return Err(DataError::ResponseFormatChanged(format!(
                "missing column '{required}'"
            )));
        }
    }

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize::<RawRecord>().enumerate() {
        let row = result.map_err(|e| {
            DataError::ResponseFormatChanged(format!("malformed CSV row {}: {e}", line + 1))
        })?;
        rows.push(row);
    }
    Ok(rows)
}
