//! DeliveryLab CLI: fetch, interactive session, default dates and cache commands.
//!
//! Commands:
//! - `fetch`: fetch and summarize one symbol over a date range
//! - `session`: interactive loop sharing one cache across fetches
//! - `defaults show|set`: the date range used when none is given
//! - `cache clear`: remove the Parquet cache tier

mod repl;
mod report;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use deliverylab_core::config::DefaultDates;
use deliverylab_core::data::{
    CsvImportProvider, DailyRecordProvider, DiskCache, FetchSession, NseProvider,
};
use deliverylab_core::{DashboardConfig, QuickRange};

#[derive(Parser)]
#[command(
    name = "deliverylab",
    about = "DeliveryLab CLI: NSE price, volume and delivery data"
)]
struct Cli {
    /// Config file. Defaults to {config_dir}/deliverylab/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. info, deliverylab_core=debug).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, normalize and summarize daily data for one symbol.
    Fetch {
        /// NSE symbol (e.g., SBIN, RELIANCE, M&M).
        symbol: String,

        /// Start date (YYYY-MM-DD). Defaults to the stored default.
        #[arg(long)]
        from: Option<NaiveDate>,

        /// End date (YYYY-MM-DD). Defaults to the stored default.
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Quick range ending today: 1W, 1M, 6M, 1Y.
        #[arg(long, conflicts_with_all = ["from", "to"])]
        range: Option<QuickRange>,

        /// Print one line per trading day.
        #[arg(long, default_value_t = false)]
        show_data: bool,

        /// Write the normalized series to this CSV file.
        #[arg(long)]
        export: Option<PathBuf>,

        /// Read rows from a downloaded NSE CSV export instead of the network.
        #[arg(long)]
        offline_csv: Option<PathBuf>,
    },
    /// Interactive session reading commands from stdin.
    Session {
        /// Read rows from a downloaded NSE CSV export instead of the network.
        #[arg(long)]
        offline_csv: Option<PathBuf>,
    },
    /// Default date range management.
    Defaults {
        #[command(subcommand)]
        action: DefaultsAction,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum DefaultsAction {
    /// Print the stored default range.
    Show,
    /// Store a new default range.
    Set {
        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached series from the Parquet tier.
    Clear {
        /// Cache directory. Defaults to `cache.disk_dir` from the config.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

/// How the caller picked the date range.
#[derive(Debug, Clone, PartialEq)]
pub enum DateSelection {
    /// Nothing given: use the stored defaults.
    Default,
    /// Explicit bounds; a missing bound falls back to the stored default.
    Manual {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    Range(QuickRange),
}

impl DateSelection {
    fn from_args(from: Option<NaiveDate>, to: Option<NaiveDate>, range: Option<QuickRange>) -> Self {
        match (range, from, to) {
            (Some(range), _, _) => DateSelection::Range(range),
            (None, None, None) => DateSelection::Default,
            (None, from, to) => DateSelection::Manual { from, to },
        }
    }

    /// Manually chosen ranges are remembered as the next default.
    pub fn is_manual(&self) -> bool {
        matches!(self, DateSelection::Manual { .. })
    }
}

type Session = FetchSession<Box<dyn DailyRecordProvider>>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config_path = cli.config.unwrap_or_else(DashboardConfig::default_path);
    let mut config = DashboardConfig::load_or_default(&config_path)?;
    tracing::debug!(path = %config_path.display(), "loaded config");

    match cli.command {
        Commands::Fetch {
            symbol,
            from,
            to,
            range,
            show_data,
            export,
            offline_csv,
        } => run_fetch(
            &mut config,
            &config_path,
            &symbol,
            DateSelection::from_args(from, to, range),
            show_data,
            export.as_deref(),
            offline_csv,
        ),
        Commands::Session { offline_csv } => {
            let session = build_session(&config, offline_csv)?;
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            repl::run(
                &session,
                &mut config,
                &config_path,
                today(),
                stdin.lock(),
                &mut stdout,
            )
        }
        Commands::Defaults { action } => match action {
            DefaultsAction::Show => run_defaults_show(&config, &config_path),
            DefaultsAction::Set { from, to } => {
                run_defaults_set(&mut config, &config_path, from, to)
            }
        },
        Commands::Cache { action } => match action {
            CacheAction::Clear { cache_dir } => run_cache_clear(&config, cache_dir),
        },
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Provider from the config (or the offline export), wrapped in a session
/// with the configured TTL and optional disk tier.
fn build_session(config: &DashboardConfig, offline_csv: Option<PathBuf>) -> Result<Session> {
    let provider: Box<dyn DailyRecordProvider> = match offline_csv {
        Some(path) => Box::new(CsvImportProvider::new(path)),
        None => Box::new(NseProvider::new(&config.provider)?),
    };
    tracing::debug!(provider = provider.name(), ttl = ?config.cache.ttl(), "starting session");

    let mut session = FetchSession::new(provider, config.cache.ttl());
    if let Some(dir) = &config.cache.disk_dir {
        session = session.with_disk_cache(DiskCache::new(dir, config.cache.ttl()));
    }
    Ok(session)
}

/// Turn a date selection into concrete bounds.
pub fn resolve_dates(
    selection: &DateSelection,
    defaults: &DefaultDates,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    let (from, to) = match selection {
        DateSelection::Default => (defaults.from, defaults.to),
        DateSelection::Manual { from, to } => {
            (from.unwrap_or(defaults.from), to.unwrap_or(defaults.to))
        }
        DateSelection::Range(range) => range
            .resolve(today)
            .unwrap_or((defaults.from, defaults.to)),
    };
    if from > to {
        bail!("start date {from} is after end date {to}");
    }
    Ok((from, to))
}

/// Store a manually chosen range as the new default. Save failures are logged, not fatal.
pub fn remember_manual_dates(
    config: &mut DashboardConfig,
    config_path: &Path,
    from: NaiveDate,
    to: NaiveDate,
) {
    if !config.remember_dates(from, to) {
        return;
    }
    match config.save(config_path) {
        Ok(()) => tracing::debug!(%from, %to, "remembered default range"),
        Err(e) => tracing::warn!(error = %e, "failed to save default range"),
    }
}

fn run_fetch(
    config: &mut DashboardConfig,
    config_path: &Path,
    symbol: &str,
    selection: DateSelection,
    show_data: bool,
    export: Option<&Path>,
    offline_csv: Option<PathBuf>,
) -> Result<()> {
    let (from, to) = resolve_dates(&selection, &config.defaults, today())?;
    let session = build_session(config, offline_csv)?;

    let (series, source) = session
        .fetch(symbol, from, to)
        .with_context(|| format!("fetching {symbol} from {from} to {to}"))?;

    let mut stdout = io::stdout().lock();
    report::write_summary(&mut stdout, &series, source, &session.stats())?;
    if show_data {
        report::write_table(&mut stdout, &series)?;
    }

    if let Some(path) = export {
        let file = File::create(path)
            .with_context(|| format!("creating export file {}", path.display()))?;
        series.write_csv(BufWriter::new(file))?;
        writeln!(stdout)?;
        writeln!(stdout, "Exported {} rows to {}", series.len(), path.display())?;
    }

    if selection.is_manual() {
        remember_manual_dates(config, config_path, from, to);
    }
    Ok(())
}

fn run_defaults_show(config: &DashboardConfig, config_path: &Path) -> Result<()> {
    println!("Config:  {}", config_path.display());
    println!("From:    {}", config.defaults.from);
    println!("To:      {}", config.defaults.to);
    Ok(())
}

fn run_defaults_set(
    config: &mut DashboardConfig,
    config_path: &Path,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<()> {
    if from > to {
        bail!("start date {from} is after end date {to}");
    }
    if config.remember_dates(from, to) {
        config.save(config_path)?;
        println!("Default range set to {from} .. {to}");
    } else {
        println!("Default range unchanged ({from} .. {to})");
    }
    Ok(())
}

fn run_cache_clear(config: &DashboardConfig, cache_dir: Option<PathBuf>) -> Result<()> {
    let Some(dir) = cache_dir.or_else(|| config.cache.disk_dir.clone()) else {
        println!("No disk cache configured (set cache.disk_dir or pass --cache-dir).");
        return Ok(());
    };
    let removed = DiskCache::new(&dir, config.cache.ttl()).clear()?;
    println!("Removed {removed} symbol(s) from {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn range_conflicts_with_explicit_dates() {
        let parsed = Cli::try_parse_from([
            "deliverylab", "fetch", "SBIN", "--range", "1M", "--from", "2025-09-01",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn fetch_args_map_to_selection() {
        let cli = Cli::try_parse_from(["deliverylab", "fetch", "SBIN", "--range", "6m"]).unwrap();
        let Commands::Fetch { from, to, range, .. } = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(
            DateSelection::from_args(from, to, range),
            DateSelection::Range(QuickRange::SixMonths)
        );
        assert_eq!(DateSelection::from_args(None, None, None), DateSelection::Default);
        assert!(DateSelection::from_args(Some(day(9, 1)), None, None).is_manual());
    }

    #[test]
    fn resolves_each_selection() {
        let defaults = DefaultDates::default();
        let today = day(9, 30);

        assert_eq!(
            resolve_dates(&DateSelection::Default, &defaults, today).unwrap(),
            (day(2, 1), day(9, 2))
        );
        assert_eq!(
            resolve_dates(
                &DateSelection::Manual {
                    from: Some(day(8, 1)),
                    to: None
                },
                &defaults,
                today
            )
            .unwrap(),
            (day(8, 1), day(9, 2))
        );
        assert_eq!(
            resolve_dates(&DateSelection::Range(QuickRange::OneMonth), &defaults, today).unwrap(),
            (day(8, 30), today)
        );
        assert_eq!(
            resolve_dates(&DateSelection::Range(QuickRange::Manual), &defaults, today).unwrap(),
            (day(2, 1), day(9, 2))
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        let selection = DateSelection::Manual {
            from: Some(day(9, 10)),
            to: Some(day(9, 1)),
        };
        assert!(resolve_dates(&selection, &DefaultDates::default(), day(9, 30)).is_err());
    }

    #[test]
    fn manual_dates_are_persisted_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = DashboardConfig::default();

        remember_manual_dates(&mut config, &path, day(9, 1), day(9, 2));
        assert_eq!(DashboardConfig::load_or_default(&path).unwrap(), config);

        std::fs::remove_file(&path).unwrap();
        remember_manual_dates(&mut config, &path, day(9, 1), day(9, 2));
        assert!(!path.exists());
    }
}
