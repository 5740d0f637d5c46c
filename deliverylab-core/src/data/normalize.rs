//! Fetch-and-normalize pipeline.
//!
//! Turns loosely typed provider rows into an ordered, analysis-ready series:
//!
//! 1. keep only the regular equity series (`EQ`)
//! 2. parse the ten numeric cells, stripping thousands separators; a cell
//!    that does not parse becomes `None`, it never fails the row
//! 3. parse the trade date; rows without one are dropped
//! 4. stable sort by date (duplicates kept, in arrival order)
//! 5. percent price change against the previous close, 0 for the first day
//! 6. delivery percentage: `-` is missing, trailing `%` stripped, forward
//!    filled, defaulting to 0, clamped into `[0, 100]`

use chrono::NaiveDate;

use super::provider::{DailyRecordProvider, DataError};
use crate::domain::{NormalizedRecord, NormalizedSeries, QueryKey, RawRecord};

/// Series classifier of the regular equity market.
pub const EQUITY_SERIES: &str = "EQ";

/// Placeholder NSE uses for an unpublished value.
const PLACEHOLDER: &str = "-";

/// Accepted trade-date formats, in the order they are tried.
const DATE_FORMATS: [&str; 3] = ["%d-%b-%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Fetch rows for `key` from `provider` and normalize them.
///
/// Errors from the provider pass through unchanged. Zero `EQ` rows is an
/// upstream failure; rows that survive filtering but all lack a usable date
/// are a validation failure.
pub fn normalize(
    provider: &dyn DailyRecordProvider,
    key: &QueryKey,
) -> Result<NormalizedSeries, DataError> {
    let raw = provider.get_daily_records(key.symbol(), &key.provider_from(), &key.provider_to())?;
    tracing::debug!(
        provider = provider.name(),
        symbol = key.symbol(),
        rows = raw.len(),
        "received raw rows"
    );
    normalize_records(key, raw)
}

/// Normalize rows that have already been fetched for `key`.
pub fn normalize_records(
    key: &QueryKey,
    raw: Vec<RawRecord>,
) -> Result<NormalizedSeries, DataError> {
    let equity: Vec<RawRecord> = raw
        .into_iter()
        .filter(|r| r.series.trim() == EQUITY_SERIES)
        .collect();

    if equity.is_empty() {
        return Err(DataError::NoRows {
            symbol: key.symbol().to_string(),
            from: key.provider_from(),
            to: key.provider_to(),
        });
    }

    let candidates = equity.len();
    let mut rows: Vec<ParsedRow> = equity
        .iter()
        .filter_map(|r| {
            let parsed = ParsedRow::from_raw(r);
            if parsed.is_none() {
                tracing::debug!(date = %r.date, "dropping row with unparseable date");
            }
            parsed
        })
        .collect();

    if rows.is_empty() {
        return Err(DataError::ValidationError(format!(
            "none of {candidates} {EQUITY_SERIES} rows for {} has a parseable date",
            key.symbol()
        )));
    }

    // `sort_by_key` is stable: equal dates keep arrival order.
    rows.sort_by_key(|r| r.date);

    let changes = percent_changes(rows.iter().map(|r| r.close));
    let delivered = fill_percent_delivered(rows.iter().map(|r| r.percent_delivered));

    let records = rows
        .into_iter()
        .zip(changes)
        .zip(delivered)
        .map(|((row, change), pct)| row.into_record(change, pct))
        .collect();

    Ok(NormalizedSeries {
        symbol: key.symbol().to_string(),
        records,
    })
}

/// A row after per-cell parsing, before the series-wide passes.
struct ParsedRow {
    date: NaiveDate,
    prev_close: Option<f64>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    last: Option<f64>,
    close: Option<f64>,
    total_traded_quantity: Option<f64>,
    deliverable_quantity: Option<f64>,
    number_of_trades: Option<f64>,
    percent_delivered: Option<f64>,
}

impl ParsedRow {
    fn from_raw(raw: &RawRecord) -> Option<Self> {
        Some(Self {
            date: parse_date(&raw.date)?,
            prev_close: parse_number(&raw.prev_close),
            open: parse_number(&raw.open),
            high: parse_number(&raw.high),
            low: parse_number(&raw.low),
            last: parse_number(&raw.last),
            close: parse_number(&raw.close),
            total_traded_quantity: parse_number(&raw.total_traded_quantity),
            deliverable_quantity: parse_number(&raw.deliverable_quantity),
            number_of_trades: parse_number(&raw.number_of_trades),
            percent_delivered: parse_percent(&raw.percent_delivered),
        })
    }

    fn into_record(self, percent_price_change: f64, percent_delivered: f64) -> NormalizedRecord {
        let total = self.total_traded_quantity.map(to_quantity);
        let mut delivered = self.deliverable_quantity.map(to_quantity);
        if let (Some(t), Some(d)) = (total, delivered) {
            if d > t {
                tracing::warn!(
                    date = %self.date,
                    deliverable = d,
                    total = t,
                    "deliverable quantity exceeds traded quantity, clamping"
                );
                delivered = Some(t);
            }
        }

        NormalizedRecord {
            date: self.date,
            prev_close: self.prev_close,
            open: self.open,
            high: self.high,
            low: self.low,
            last: self.last,
            close: self.close,
            total_traded_quantity: total,
            deliverable_quantity: delivered,
            number_of_trades: self.number_of_trades.map(to_quantity),
            percent_delivered,
            percent_price_change,
        }
    }
}

/// Parse a provider number such as `"1,23,456.50"`.
///
/// Placeholders, blanks, garbage, negatives and non-finite values are `None`.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || cleaned == PLACEHOLDER {
        return None;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Parse a delivery percentage such as `"45.2%"` or `"45.20"`.
///
/// The `-` placeholder and anything unparseable are `None`. Range clamping
/// happens after forward fill.
pub fn parse_percent(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed == PLACEHOLDER {
        return None;
    }
    let number = trimmed.trim_end_matches('%').trim();
    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parse a trade date in any of the accepted provider formats.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    let trimmed = cell.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

fn to_quantity(value: f64) -> u64 {
    value.round() as u64
}

/// `(close[i] / close_prev - 1) * 100`, where `close_prev` is the nearest
/// earlier close that is present.
///
/// The first record, a record without a close, and a non-finite ratio
/// (previous close of zero) all yield 0.
pub fn percent_changes<I>(closes: I) -> Vec<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut prev: Option<f64> = None;
    closes
        .into_iter()
        .map(|close| {
            let change = match (prev, close) {
                (Some(p), Some(c)) => {
                    let pct = (c / p - 1.0) * 100.0;
                    if pct.is_finite() {
                        pct
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            };
            if close.is_some() {
                prev = close;
            }
            change
        })
        .collect()
}

/// Forward-fill missing delivery percentages, default 0, clamp to `[0, 100]`.
pub fn fill_percent_delivered<I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut last_seen: Option<f64> = None;
    values
        .into_iter()
        .map(|v| {
            if v.is_some() {
                last_seen = v;
            }
            last_seen.unwrap_or(0.0).clamp(0.0, 100.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_strip_thousands_separators() {
        assert_eq!(parse_number("1,23,456.50"), Some(123456.5));
        assert_eq!(parse_number(" 99.00 "), Some(99.0));
        assert_eq!(parse_number("1,000"), Some(1000.0));
    }

    #[test]
    fn bad_numbers_are_missing() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("-5.0"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn percent_parsing() {
        assert_eq!(parse_percent("45.2%"), Some(45.2));
        assert_eq!(parse_percent("49.59"), Some(49.59));
        assert_eq!(parse_percent(" 50.0 % "), Some(50.0));
        assert_eq!(parse_percent("-"), None);
        assert_eq!(parse_percent(""), None);
        assert_eq!(parse_percent("%"), None);
        // Out-of-range values survive parsing; clamping comes later.
        assert_eq!(parse_percent("120%"), Some(120.0));
    }

    #[test]
    fn dates_in_provider_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 9, 2).unwrap();
        assert_eq!(parse_date("02-Sep-2025"), Some(expected));
        assert_eq!(parse_date("02-09-2025"), Some(expected));
        assert_eq!(parse_date("2025-09-02"), Some(expected));
        assert_eq!(parse_date("31-02-2025"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn changes_skip_missing_closes() {
        let changes = percent_changes([Some(100.0), None, Some(110.0), Some(99.0)]);
        assert_eq!(changes[0], 0.0);
        assert_eq!(changes[1], 0.0);
        assert!((changes[2] - 10.0).abs() < 1e-9);
        assert!((changes[3] - -10.0).abs() < 1e-9);
    }

    #[test]
    fn change_after_zero_close_is_zero() {
        assert_eq!(percent_changes([Some(0.0), Some(5.0)]), vec![0.0, 0.0]);
    }

    #[test]
    fn delivered_forward_fill_default_and_clamp() {
        assert_eq!(
            fill_percent_delivered([None, Some(45.2), None, Some(150.0), None, Some(-3.0)]),
            vec![0.0, 45.2, 45.2, 100.0, 100.0, 0.0]
        );
    }
}
