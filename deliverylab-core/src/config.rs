//! TOML configuration: provider endpoint, cache policy and remembered dates.
//!
//! ```toml
//! [provider]
//! base_url = "https://www.nseindia.com"
//! user_agent = "Mozilla/5.0 ..."
//! # timeout_secs = 30
//!
//! [cache]
//! ttl_secs = 1800
//! # disk_dir = "data"
//!
//! [defaults]
//! from = "2025-02-01"
//! to = "2025-09-02"
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default cache time-to-live: 30 minutes.
pub const DEFAULT_TTL_SECS: u64 = 30 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub defaults: DefaultDates,
}

/// Upstream endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub user_agent: String,
    /// No timeout when unset: a hung upstream blocks the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.nseindia.com".into(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Parquet cache tier; in-memory only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            disk_dir: None,
        }
    }
}

/// Date range used when the caller gives none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefaultDates {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Default for DefaultDates {
    fn default() -> Self {
        Self {
            from: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap_or_default(),
            to: NaiveDate::from_ymd_opt(2025, 9, 2).unwrap_or_default(),
        }
    }
}

impl DashboardConfig {
    /// `{config_dir}/deliverylab/config.toml`, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deliverylab")
            .join("config.toml")
    }

    /// Load from `path`. A missing file yields the defaults; a malformed one is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save to `path`, creating parent directories. Writes are atomic: write to .tmp then rename.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        let text = toml::to_string_pretty(self)?;
        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, text).map_err(write_err)?;
        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            write_err(e)
        })
    }

    /// Remember a manually chosen range as the new default.
    ///
    /// Returns true if the stored range changed.
    pub fn remember_dates(&mut self, from: NaiveDate, to: NaiveDate) -> bool {
        let next = DefaultDates { from, to };
        if self.defaults == next {
            return false;
        }
        self.defaults = next;
        true
    }
}
