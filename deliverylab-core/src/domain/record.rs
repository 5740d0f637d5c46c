//! Raw provider rows and the normalized trading-day series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::data::provider::DataError;

/// One row exactly as the provider formats it.
///
/// Every value is kept as text; numbers usually carry thousands separators
/// and the delivery percentage may be `"-"` when NSE has not published it.
/// Column names are accepted in the raw NSE header form (`"Prev Close"`) and
/// in the compacted form used by most client libraries (`"PrevClose"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Series")]
    pub series: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "PrevClose", alias = "Prev Close")]
    pub prev_close: String,
    #[serde(rename = "OpenPrice", alias = "Open Price")]
    pub open: String,
    #[serde(rename = "HighPrice", alias = "High Price")]
    pub high: String,
    #[serde(rename = "LowPrice", alias = "Low Price")]
    pub low: String,
    #[serde(rename = "LastPrice", alias = "Last Price")]
    pub last: String,
    #[serde(rename = "ClosePrice", alias = "Close Price")]
    pub close: String,
    #[serde(rename = "AveragePrice", alias = "Average Price")]
    pub average_price: String,
    #[serde(rename = "TotalTradedQuantity", alias = "Total Traded Quantity")]
    pub total_traded_quantity: String,
    #[serde(rename = "Turnover₹", alias = "Turnover ₹", alias = "Turnover")]
    pub turnover: String,
    #[serde(rename = "No.ofTrades", alias = "No. of Trades")]
    pub number_of_trades: String,
    #[serde(rename = "DeliverableQty", alias = "Deliverable Qty")]
    pub deliverable_quantity: String,
    #[serde(rename = "%DlyQttoTradedQty", alias = "% Dly Qt to Traded Qty")]
    pub percent_delivered: String,
}

/// One validated trading day.
///
/// Price and quantity cells that could not be parsed are `None`; the
/// delivery percentage and the price change are always defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub date: NaiveDate,
    pub prev_close: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub last: Option<f64>,
    pub close: Option<f64>,
    pub total_traded_quantity: Option<u64>,
    pub deliverable_quantity: Option<u64>,
    pub number_of_trades: Option<u64>,
    /// Delivered / traded, in `[0, 100]`.
    pub percent_delivered: f64,
    /// Change of close against the previous close, in percent. 0 for the first day.
    pub percent_price_change: f64,
}

impl NormalizedRecord {
    /// Traded volume that was squared off intraday rather than delivered.
    pub fn intraday_quantity(&self) -> Option<u64> {
        match (self.total_traded_quantity, self.deliverable_quantity) {
            (Some(total), Some(delivered)) => Some(total.saturating_sub(delivered)),
            _ => None,
        }
    }
}

/// Ordered daily records for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSeries {
    pub symbol: String,
    pub records: Vec<NormalizedRecord>,
}

impl NormalizedSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// Upper bound for the trade-count axis: 20% headroom over the busiest day.
    pub fn trades_axis_max(&self) -> f64 {
        let max = self
            .records
            .iter()
            .filter_map(|r| r.number_of_trades)
            .max()
            .unwrap_or(0);
        max as f64 * 1.2
    }

    /// Columnar view of the series (one column per record field).
    pub fn to_dataframe(&self) -> Result<polars::prelude::DataFrame, DataError> {
        crate::data::disk_cache::series_to_dataframe(self)
    }

    /// Write the series as CSV with a header row. Missing cells are empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), DataError> {
        let mut wtr = csv::Writer::from_writer(writer);
        for record in &self.records {
            wtr.serialize(record)
                .map_err(|e| DataError::Other(format!("csv export: {e}")))?;
        }
        wtr.flush()
            .map_err(|e| DataError::Other(format!("csv export: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: NaiveDate, trades: Option<u64>) -> NormalizedRecord {
        NormalizedRecord {
            date,
            prev_close: Some(99.0),
            open: Some(99.5),
            high: Some(101.0),
            low: Some(98.0),
            last: Some(100.4),
            close: Some(100.5),
            total_traded_quantity: Some(10_000),
            deliverable_quantity: Some(4_520),
            number_of_trades: trades,
            percent_delivered: 45.2,
            percent_price_change: 0.0,
        }
    }

    #[test]
    fn intraday_is_total_minus_delivered() {
        let r = record(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(), Some(10));
        assert_eq!(r.intraday_quantity(), Some(5_480));

        let mut missing = r.clone();
        missing.deliverable_quantity = None;
        assert_eq!(missing.intraday_quantity(), None);
    }

    #[test]
    fn trades_axis_has_headroom() {
        let day = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let series = NormalizedSeries {
            symbol: "SBIN".into(),
            records: vec![record(day, Some(100)), record(day, None), record(day, Some(250))],
        };
        assert!((series.trades_axis_max() - 300.0).abs() < 1e-9);
    }

    #[test]
    fn csv_export_has_header_and_blank_missing_cells() {
        let day = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let mut r = record(day, Some(42));
        r.open = None;
        let series = NormalizedSeries {
            symbol: "SBIN".into(),
            records: vec![r],
        };

        let mut buf = Vec::new();
        series.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("date,prev_close,open,"));
        assert!(lines.next().unwrap().starts_with("2025-09-01,99.0,,"));
    }

    #[test]
    fn raw_record_reads_both_header_styles() {
        let raw_headers = "Symbol,Series,Date,Prev Close,Close Price,% Dly Qt to Traded Qty\n\
                           SBIN,EQ,01-Sep-2025,\"1,000.00\",\"1,010.00\",45.2%\n";
        let compact_headers = "Symbol,Series,Date,PrevClose,ClosePrice,%DlyQttoTradedQty\n\
                               SBIN,EQ,01-Sep-2025,\"1,000.00\",\"1,010.00\",45.2%\n";

        for input in [raw_headers, compact_headers] {
            let mut rdr = csv::Reader::from_reader(input.as_bytes());
            let rows: Vec<RawRecord> = rdr.deserialize().collect::<Result<_, _>>().unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].prev_close, "1,000.00");
            assert_eq!(rows[0].close, "1,010.00");
            assert_eq!(rows[0].percent_delivered, "45.2%");
            assert_eq!(rows[0].open, "");
        }
    }
}
