//! Plain-text rendering of fetched series.

use std::io::{self, Write};

use deliverylab_core::data::{FetchSource, FetchStats};
use deliverylab_core::format::{format_indian_number, format_quantity};
use deliverylab_core::NormalizedSeries;

/// Summary block: period, source label, counters and latest-day metrics.
pub fn write_summary<W: Write>(
    out: &mut W,
    series: &NormalizedSeries,
    source: FetchSource,
    stats: &FetchStats,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "=== {} ===", series.symbol)?;
    if let (Some(first), Some(last)) = (series.first_date(), series.last_date()) {
        writeln!(
            out,
            "Period:          {first} to {last} ({} trading days)",
            series.len()
        )?;
    }
    writeln!(out, "Source:          {source}")?;
    writeln!(out, "Fresh fetches:   {}", stats.fresh_fetches)?;
    if let Some(latency) = stats.last_latency {
        writeln!(out, "Last latency:    {} ms", latency.as_millis())?;
    }

    if let Some(latest) = series.records.last() {
        writeln!(out)?;
        writeln!(out, "--- Latest ({}) ---", latest.date)?;
        writeln!(
            out,
            "Close:           {} ({:+.2}%)",
            latest.close.map_or_else(|| "-".to_string(), |c| format!("{c:.2}")),
            latest.percent_price_change
        )?;
        writeln!(
            out,
            "Traded:          {}",
            format_quantity(latest.total_traded_quantity)
        )?;
        writeln!(
            out,
            "Delivered:       {} ({:.2}%)",
            format_quantity(latest.deliverable_quantity),
            latest.percent_delivered
        )?;
        writeln!(
            out,
            "Intraday:        {}",
            format_quantity(latest.intraday_quantity())
        )?;
        writeln!(
            out,
            "Trades:          {}",
            format_quantity(latest.number_of_trades)
        )?;
    }

    let avg_delivered = if series.is_empty() {
        0.0
    } else {
        series.records.iter().map(|r| r.percent_delivered).sum::<f64>() / series.len() as f64
    };
    writeln!(out)?;
    writeln!(out, "Avg delivered:   {avg_delivered:.2}%")?;
    writeln!(
        out,
        "Trades axis max: {}",
        format_indian_number(series.trades_axis_max())
    )?;
    Ok(())
}

/// One line per trading day.
pub fn write_table<W: Write>(out: &mut W, series: &NormalizedSeries) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{:<10} {:>10} {:>8} {:>11} {:>11} {:>11} {:>7} {:>10}",
        "Date", "Close", "Chg%", "Traded", "Delivered", "Intraday", "Dly%", "Trades"
    )?;
    writeln!(out, "{}", "-".repeat(85))?;
    for r in &series.records {
        writeln!(
            out,
            "{:<10} {:>10} {:>8.2} {:>11} {:>11} {:>11} {:>7.2} {:>10}",
            r.date.to_string(),
            r.close.map_or_else(|| "-".to_string(), |c| format!("{c:.2}")),
            r.percent_price_change,
            format_quantity(r.total_traded_quantity),
            format_quantity(r.deliverable_quantity),
            format_quantity(r.intraday_quantity()),
            r.percent_delivered,
            format_quantity(r.number_of_trades),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use deliverylab_core::NormalizedRecord;
    use std::time::Duration;

    fn series() -> NormalizedSeries {
        let day = |d| NaiveDate::from_ymd_opt(2025, 9, d).unwrap();
        let record = |d, close: f64, change: f64| NormalizedRecord {
            date: day(d),
            prev_close: None,
            open: None,
            high: None,
            low: None,
            last: None,
            close: Some(close),
            total_traded_quantity: Some(12_345_678),
            deliverable_quantity: Some(6_122_839),
            number_of_trades: Some(210_345),
            percent_delivered: 49.6,
            percent_price_change: change,
        };
        NormalizedSeries {
            symbol: "SBIN".into(),
            records: vec![record(1, 800.0, 0.0), record(2, 812.0, 1.5)],
        }
    }

    #[test]
    fn summary_shows_source_and_indian_units() {
        let stats = FetchStats {
            fresh_fetches: 3,
            last_source: Some(FetchSource::Cache),
            last_latency: Some(Duration::from_millis(250)),
        };
        let mut out = Vec::new();
        write_summary(&mut out, &series(), FetchSource::Cache, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("=== SBIN ==="));
        assert!(text.contains("2025-09-01 to 2025-09-02 (2 trading days)"));
        assert!(text.contains("Source:          cache"));
        assert!(text.contains("Fresh fetches:   3"));
        assert!(text.contains("Last latency:    250 ms"));
        assert!(text.contains("812.00 (+1.50%)"));
        assert!(text.contains("Traded:          1.23 Cr"));
        assert!(text.contains("Intraday:        62.23 L"));
    }

    #[test]
    fn table_has_one_line_per_day() {
        let mut out = Vec::new();
        write_table(&mut out, &series()).unwrap();
        let text = String::from_utf8(out).unwrap();

        let rows: Vec<&str> = text.lines().filter(|l| l.starts_with("2025-")).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains("812.00"));
        assert!(rows[1].contains("2.10 L"));
    }
}
