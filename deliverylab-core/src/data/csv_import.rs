//! Offline provider backed by an NSE CSV export on disk.
//!
//! Serves the same rows the NSE endpoint would, restricted to the requested
//! symbol and date range. Useful when the endpoint refuses the client and
//! for reproducible runs.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use super::normalize::parse_date;
use super::nse::parse_csv_payload;
use super::provider::{DailyRecordProvider, DataError};
use crate::domain::{RawRecord, PROVIDER_DATE_FORMAT};

pub struct CsvImportProvider {
    path: PathBuf,
}

impl CsvImportProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn parse_bound(value: &str) -> Result<NaiveDate, DataError> {
    NaiveDate::parse_from_str(value, PROVIDER_DATE_FORMAT)
        .map_err(|e| DataError::InvalidQuery(format!("bad date '{value}': {e}")))
}

impl DailyRecordProvider for CsvImportProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn get_daily_records(
        &self,
        symbol: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<RawRecord>, DataError> {
        let from = parse_bound(from)?;
        let to = parse_bound(to)?;
        let body = fs::read_to_string(&self.path).map_err(|e| {
            DataError::SourceUnavailable(format!("{}: {e}", self.path.display()))
        })?;

        let rows = parse_csv_payload(&body)?
            .into_iter()
            .filter(|r| r.symbol.trim().is_empty() || r.symbol.trim().eq_ignore_ascii_case(symbol))
            // Rows with unreadable dates are passed through; the pipeline drops them.
            .filter(|r| parse_date(&r.date).map_or(true, |d| d >= from && d <= to))
            .collect();
        Ok(rows)
    }
}
