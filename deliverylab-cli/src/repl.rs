//! Interactive session: one fetch session shared by every command read from input.
//!
//! Commands:
//! - `fetch SYMBOL`: fetch over the default date range
//! - `fetch SYMBOL FROM TO`: explicit dates (YYYY-MM-DD), remembered as the new default
//! - `fetch SYMBOL RANGE`: quick range (1W, 1M, 6M, 1Y) ending today
//! - `show`: print the day table of the last fetched series
//! - `clear`: drop every cached series
//! - `stats`: print session counters
//! - `help`, `quit`

use anyhow::{bail, Result};
use chrono::NaiveDate;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use deliverylab_core::data::{DailyRecordProvider, FetchSession};
use deliverylab_core::{DashboardConfig, NormalizedSeries, QuickRange};

use crate::report;
use crate::{remember_manual_dates, resolve_dates, DateSelection};

const HELP: &str = "\
Commands:
  fetch SYMBOL                 fetch over the default date range
  fetch SYMBOL FROM TO         explicit dates (YYYY-MM-DD)
  fetch SYMBOL 1W|1M|6M|1Y     quick range ending today
  show                         day table of the last fetched series
  clear                        drop every cached series
  stats                        session counters
  help                         this text
  quit                         leave the session";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Fetch {
        symbol: String,
        dates: DateSelection,
    },
    Show,
    Clear,
    Stats,
    Help,
    Quit,
}

/// Parse one input line. Blank lines and `#` comments are `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    if verb.starts_with('#') {
        return Ok(None);
    }
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("fetch", [symbol]) => Command::Fetch {
            symbol: symbol.to_string(),
            dates: DateSelection::Default,
        },
        ("fetch", [symbol, range]) => Command::Fetch {
            symbol: symbol.to_string(),
            dates: DateSelection::Range(range.parse::<QuickRange>()?),
        },
        ("fetch", [symbol, from, to]) => Command::Fetch {
            symbol: symbol.to_string(),
            dates: DateSelection::Manual {
                from: Some(parse_day(from)?),
                to: Some(parse_day(to)?),
            },
        },
        ("fetch", _) => bail!("usage: fetch SYMBOL [FROM TO | RANGE]"),
        ("show", []) => Command::Show,
        ("clear", []) => Command::Clear,
        ("stats", []) => Command::Stats,
        ("help", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        (other, _) => bail!("unknown command '{other}', try 'help'"),
    };
    Ok(Some(command))
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("bad date '{value}' (expected YYYY-MM-DD): {e}"))
}

/// Run commands from `input` until `quit` or end of input.
///
/// Command and fetch errors are reported on `out` and the loop continues.
pub fn run<P, R, W>(
    session: &FetchSession<P>,
    config: &mut DashboardConfig,
    config_path: &Path,
    today: NaiveDate,
    input: R,
    out: &mut W,
) -> Result<()>
where
    P: DailyRecordProvider,
    R: BufRead,
    W: Write,
{
    let mut last: Option<Arc<NormalizedSeries>> = None;
    writeln!(out, "{HELP}")?;

    for line in input.lines() {
        let line = line?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "error: {e}")?;
                continue;
            }
        };

        match command {
            Command::Fetch { symbol, dates } => {
                let (from, to) = match resolve_dates(&dates, &config.defaults, today) {
                    Ok(range) => range,
                    Err(e) => {
                        writeln!(out, "error: {e}")?;
                        continue;
                    }
                };
                match session.fetch(&symbol, from, to) {
                    Ok((series, source)) => {
                        report::write_summary(out, &series, source, &session.stats())?;
                        if dates.is_manual() {
                            remember_manual_dates(config, config_path, from, to);
                        }
                        last = Some(series);
                    }
                    Err(e) => writeln!(out, "error: {e}")?,
                }
            }
            Command::Show => match &last {
                Some(series) => report::write_table(out, series)?,
                None => writeln!(out, "nothing fetched yet")?,
            },
            Command::Clear => {
                session.clear_cache();
                writeln!(out, "cache cleared")?;
            }
            Command::Stats => {
                let stats = session.stats();
                writeln!(out, "Fresh fetches:   {}", stats.fresh_fetches)?;
                writeln!(
                    out,
                    "Last source:     {}",
                    stats.last_source.map_or("-", |s| s.label())
                )?;
                writeln!(out, "Cached series:   {}", session.cached_entries())?;
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => break,
        }
    }
    Ok(())
}
