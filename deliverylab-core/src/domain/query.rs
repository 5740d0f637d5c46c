//! QueryKey and quick date ranges.

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::data::provider::DataError;

/// Date format the NSE endpoints expect for `from` / `to`.
pub const PROVIDER_DATE_FORMAT: &str = "%d-%m-%Y";

/// Cache lookup key: one symbol over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    symbol: String,
    from: NaiveDate,
    to: NaiveDate,
}

impl QueryKey {
    /// Build a key. The symbol is trimmed and upper-cased.
    pub fn new(symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Self, DataError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(DataError::InvalidQuery("symbol is empty".into()));
        }
        if from > to {
            return Err(DataError::InvalidQuery(format!(
                "from date {from} is after to date {to}"
            )));
        }
        Ok(Self { symbol, from, to })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// `from` in the provider's day-month-year convention.
    pub fn provider_from(&self) -> String {
        self.from.format(PROVIDER_DATE_FORMAT).to_string()
    }

    /// `to` in the provider's day-month-year convention.
    pub fn provider_to(&self) -> String {
        self.to.format(PROVIDER_DATE_FORMAT).to_string()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} .. {}]", self.symbol, self.from, self.to)
    }
}

/// Preset look-back windows ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuickRange {
    /// Use the explicitly supplied dates.
    Manual,
    OneWeek,
    OneMonth,
    SixMonths,
    OneYear,
}

impl QuickRange {
    /// Resolve to `(from, to)` ending on `today`.
    ///
    /// Returns `None` for `Manual`. Month arithmetic clamps to the end of the
    /// target month (31 Mar minus one month is 28/29 Feb).
    pub fn resolve(self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let from = match self {
            QuickRange::Manual => return None,
            QuickRange::OneWeek => today - Duration::weeks(1),
            QuickRange::OneMonth => sub_months(today, 1),
            QuickRange::SixMonths => sub_months(today, 6),
            QuickRange::OneYear => sub_months(today, 12),
        };
        Some((from, today))
    }

    pub fn label(self) -> &'static str {
        match self {
            QuickRange::Manual => "Manual",
            QuickRange::OneWeek => "1W",
            QuickRange::OneMonth => "1M",
            QuickRange::SixMonths => "6M",
            QuickRange::OneYear => "1Y",
        }
    }
}

fn sub_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date))
}

impl FromStr for QuickRange {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MANUAL" => Ok(QuickRange::Manual),
            "1W" => Ok(QuickRange::OneWeek),
            "1M" => Ok(QuickRange::OneMonth),
            "6M" => Ok(QuickRange::SixMonths),
            "1Y" => Ok(QuickRange::OneYear),
            other => Err(DataError::InvalidQuery(format!(
                "unknown range '{other}' (expected 1W, 1M, 6M, 1Y or Manual)"
            ))),
        }
    }
}

impl fmt::Display for QuickRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn key_normalizes_symbol() {
        let key = QueryKey::new("  sbin ", d(2025, 2, 1), d(2025, 9, 2)).unwrap();
        assert_eq!(key.symbol(), "SBIN");
        assert_eq!(key, QueryKey::new("SBIN", d(2025, 2, 1), d(2025, 9, 2)).unwrap());
    }

    #[test]
    fn key_equality_uses_all_fields() {
        let a = QueryKey::new("SBIN", d(2025, 2, 1), d(2025, 9, 2)).unwrap();
        let b = QueryKey::new("SBIN", d(2025, 2, 1), d(2025, 9, 3)).unwrap();
        let c = QueryKey::new("INFY", d(2025, 2, 1), d(2025, 9, 2)).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn key_rejects_empty_symbol_and_inverted_range() {
        assert!(matches!(
            QueryKey::new("   ", d(2025, 1, 1), d(2025, 1, 2)),
            Err(DataError::InvalidQuery(_))
        ));
        assert!(matches!(
            QueryKey::new("SBIN", d(2025, 1, 3), d(2025, 1, 2)),
            Err(DataError::InvalidQuery(_))
        ));
    }

    #[test]
    fn provider_dates_are_day_month_year() {
        let key = QueryKey::new("SBIN", d(2025, 2, 1), d(2025, 9, 2)).unwrap();
        assert_eq!(key.provider_from(), "01-02-2025");
        assert_eq!(key.provider_to(), "02-09-2025");
    }

    #[test]
    fn quick_ranges_resolve_against_today() {
        let today = d(2025, 3, 31);
        assert_eq!(QuickRange::Manual.resolve(today), None);
        assert_eq!(QuickRange::OneWeek.resolve(today), Some((d(2025, 3, 24), today)));
        assert_eq!(QuickRange::OneMonth.resolve(today), Some((d(2025, 2, 28), today)));
        assert_eq!(QuickRange::SixMonths.resolve(today), Some((d(2024, 9, 30), today)));
        assert_eq!(QuickRange::OneYear.resolve(today), Some((d(2024, 3, 31), today)));
    }

    #[test]
    fn quick_range_parsing() {
        assert_eq!("1w".parse::<QuickRange>().unwrap(), QuickRange::OneWeek);
        assert_eq!("6M".parse::<QuickRange>().unwrap(), QuickRange::SixMonths);
        assert!("2Y".parse::<QuickRange>().is_err());
    }
}
