//! Parquet cache tier with a time-to-live per query.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/{from}_{to}.parquet` plus a
//! `{from}_{to}.meta.json` sidecar (record count, BLAKE3 hash, cached_at).
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Expiry from the sidecar's `cached_at`; expired files are removed on load
//! - Integrity validation on load (schema check, row count, hash)
//! - Quarantine for corrupt files ({filename}.quarantined)

use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::provider::DataError;
use crate::domain::{NormalizedRecord, NormalizedSeries, QueryKey};

const COLUMNS: [&str; 12] = [
    "date",
    "prev_close",
    "open",
    "high",
    "low",
    "last",
    "close",
    "total_traded_quantity",
    "deliverable_quantity",
    "number_of_trades",
    "percent_delivered",
    "percent_price_change",
];

/// Metadata sidecar for one cached query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCacheMeta {
    pub symbol: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub record_count: usize,
    pub data_hash: String,
    pub cached_at: DateTime<Utc>,
}

/// A series read back from disk, with the time elapsed since it was written.
#[derive(Debug, Clone)]
pub struct DiskEntry {
    pub series: NormalizedSeries,
    pub age: Duration,
}

/// The Parquet cache.
pub struct DiskCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ttl,
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory for a specific symbol: `{cache_dir}/symbol={SYMBOL}/`
    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={symbol}"))
    }

    fn stem(key: &QueryKey) -> String {
        format!("{}_{}", key.from(), key.to())
    }

    fn data_path(&self, key: &QueryKey) -> PathBuf {
        self.symbol_dir(key.symbol())
            .join(format!("{}.parquet", Self::stem(key)))
    }

    fn meta_path(&self, key: &QueryKey) -> PathBuf {
        self.symbol_dir(key.symbol())
            .join(format!("{}.meta.json", Self::stem(key)))
    }

    /// Write a series for `key`. Writes are atomic: write to .tmp then rename.
    pub fn write(&self, key: &QueryKey, series: &NormalizedSeries) -> Result<(), DataError> {
        if series.is_empty() {
            return Err(DataError::CacheError("no records to cache".into()));
        }

        let sym_dir = self.symbol_dir(key.symbol());
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let df = series_to_dataframe(series)?;
        let path = self.data_path(key);
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        let meta = DiskCacheMeta {
            symbol: key.symbol().to_string(),
            from: key.from(),
            to: key.to(),
            record_count: series.len(),
            data_hash: hash_records(&series.records)?,
            cached_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(key), meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;

        Ok(())
    }

    /// Load a non-expired series for `key`, if one is stored.
    pub fn load(&self, key: &QueryKey) -> Result<Option<DiskEntry>, DataError> {
        self.load_at(key, Utc::now())
    }

    pub fn load_at(
        &self,
        key: &QueryKey,
        now: DateTime<Utc>,
    ) -> Result<Option<DiskEntry>, DataError> {
        let Some(meta) = self.get_meta(key) else {
            return Ok(None);
        };

        // A sidecar stamped in the future (clock skew) counts as brand new.
        let age = now
            .signed_duration_since(meta.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if age > self.ttl {
            tracing::debug!(%key, ?age, "disk cache entry expired");
            self.remove(key);
            return Ok(None);
        }

        let path = self.data_path(key);
        match load_and_validate_parquet(&path, &meta) {
            Ok(records) => Ok(Some(DiskEntry {
                series: NormalizedSeries {
                    symbol: meta.symbol,
                    records,
                },
                age,
            })),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "quarantining corrupt cache file"
                );
                self.quarantine(key, &path);
                Ok(None)
            }
        }
    }

    /// Move a corrupt data file aside and drop its sidecar so the next load is a miss.
    fn quarantine(&self, key: &QueryKey, path: &Path) {
        let target = path.with_extension("parquet.quarantined");
        if let Err(e) = fs::rename(path, &target) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to quarantine corrupt cache file"
            );
        }
        let meta_path = self.meta_path(key);
        if let Err(e) = fs::remove_file(&meta_path) {
            tracing::warn!(
                path = %meta_path.display(),
                error = %e,
                "failed to remove sidecar of corrupt cache file"
            );
        }
    }

    /// Metadata sidecar for `key`, if present and readable.
    pub fn get_meta(&self, key: &QueryKey) -> Option<DiskCacheMeta> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn remove(&self, key: &QueryKey) {
        let _ = fs::remove_file(self.data_path(key));
        let _ = fs::remove_file(self.meta_path(key));
    }

    /// Remove every cached symbol directory. Returns how many were removed.
    ///
    /// Only `symbol=*` directories are touched; anything else under the
    /// cache root is left alone.
    pub fn clear(&self) -> Result<usize, DataError> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(DataError::CacheError(format!("read dir: {e}"))),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();
            let is_symbol_dir = path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("symbol="));
            if is_symbol_dir {
                fs::remove_dir_all(&path)
                    .map_err(|e| DataError::CacheError(format!("remove {}: {e}", path.display())))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn hash_records(records: &[NormalizedRecord]) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(records)
        .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Convert a series to a Polars DataFrame, one column per record field.
pub(crate) fn series_to_dataframe(series: &NormalizedSeries) -> Result<DataFrame, DataError> {
    let records = &series.records;
    let epoch = epoch();
    let dates: Vec<i32> = records
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();
    let f = |get: fn(&NormalizedRecord) -> Option<f64>| -> Vec<Option<f64>> {
        records.iter().map(get).collect()
    };
    let q = |get: fn(&NormalizedRecord) -> Option<u64>| -> Vec<Option<u64>> {
        records.iter().map(get).collect()
    };
    let delivered: Vec<f64> = records.iter().map(|r| r.percent_delivered).collect();
    let changes: Vec<f64> = records.iter().map(|r| r.percent_price_change).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("prev_close".into(), f(|r| r.prev_close)),
        Column::new("open".into(), f(|r| r.open)),
        Column::new("high".into(), f(|r| r.high)),
        Column::new("low".into(), f(|r| r.low)),
        Column::new("last".into(), f(|r| r.last)),
        Column::new("close".into(), f(|r| r.close)),
        Column::new("total_traded_quantity".into(), q(|r| r.total_traded_quantity)),
        Column::new("deliverable_quantity".into(), q(|r| r.deliverable_quantity)),
        Column::new("number_of_trades".into(), q(|r| r.number_of_trades)),
        Column::new("percent_delivered".into(), delivered),
        Column::new("percent_price_change".into(), changes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

/// Write a DataFrame to a Parquet file.
fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

/// Load a Parquet file and validate it against its sidecar.
fn load_and_validate_parquet(
    path: &Path,
    meta: &DiskCacheMeta,
) -> Result<Vec<NormalizedRecord>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() != meta.record_count {
        return Err(DataError::ValidationError(format!(
            "expected {} rows, found {}",
            meta.record_count,
            df.height()
        )));
    }
    for col_name in &COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::ValidationError(format!(
                "missing column '{col_name}'"
            )));
        }
    }

    let records = dataframe_to_records(&df)?;
    if hash_records(&records)? != meta.data_hash {
        return Err(DataError::ValidationError("content hash mismatch".into()));
    }
    Ok(records)
}

/// Convert a DataFrame back to records.
fn dataframe_to_records(df: &DataFrame) -> Result<Vec<NormalizedRecord>, DataError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::ParquetError(format!("column read: {e}")))
    };
    let type_err =
        |name: &str, e: PolarsError| DataError::ParquetError(format!("{name} column type: {e}"));

    let date_ca = col("date")?.date().map_err(|e| type_err("date", e))?;
    let f64_col = |name: &'static str| -> Result<Float64Chunked, DataError> {
        col(name)?.f64().cloned().map_err(|e| type_err(name, e))
    };
    let u64_col = |name: &'static str| -> Result<UInt64Chunked, DataError> {
        col(name)?.u64().cloned().map_err(|e| type_err(name, e))
    };

    let prev_close = f64_col("prev_close")?;
    let open = f64_col("open")?;
    let high = f64_col("high")?;
    let low = f64_col("low")?;
    let last = f64_col("last")?;
    let close = f64_col("close")?;
    let total = u64_col("total_traded_quantity")?;
    let delivered = u64_col("deliverable_quantity")?;
    let trades = u64_col("number_of_trades")?;
    let pct_delivered = f64_col("percent_delivered")?;
    let pct_change = f64_col("percent_price_change")?;

    let epoch = epoch();
    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;

        records.push(NormalizedRecord {
            date: epoch + chrono::Duration::days(date_days as i64),
            prev_close: prev_close.get(i),
            open: open.get(i),
            high: high.get(i),
            low: low.get(i),
            last: last.get(i),
            close: close.get(i),
            total_traded_quantity: total.get(i),
            deliverable_quantity: delivered.get(i),
            number_of_trades: trades.get(i),
            percent_delivered: pct_delivered.get(i).unwrap_or(0.0),
            percent_price_change: pct_change.get(i).unwrap_or(0.0),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> QueryKey {
        QueryKey::new(
            "SBIN",
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
        )
        .unwrap()
    }

    fn sample_series() -> NormalizedSeries {
        NormalizedSeries {
            symbol: "SBIN".into(),
            records: vec![
                NormalizedRecord {
                    date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
                    prev_close: Some(98.0),
                    open: Some(98.5),
                    high: Some(99.5),
                    low: Some(97.0),
                    last: Some(99.1),
                    close: Some(99.0),
                    total_traded_quantity: Some(10_000),
                    deliverable_quantity: Some(4_520),
                    number_of_trades: Some(321),
                    percent_delivered: 45.2,
                    percent_price_change: 0.0,
                },
                NormalizedRecord {
                    date: NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
                    prev_close: Some(99.0),
                    open: None,
                    high: Some(101.0),
                    low: Some(98.8),
                    last: Some(100.4),
                    close: Some(100.5),
                    total_traded_quantity: Some(12_000),
                    deliverable_quantity: None,
                    number_of_trades: Some(400),
                    percent_delivered: 45.2,
                    percent_price_change: (100.5 / 99.0 - 1.0) * 100.0,
                },
            ],
        }
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(1800));

        cache.write(&key(), &sample_series()).unwrap();
        let loaded = cache.load(&key()).unwrap().unwrap();

        assert_eq!(loaded.series, sample_series());
        assert!(loaded.age < Duration::from_secs(60));
        assert!(dir.path().join("symbol=SBIN").join("2025-09-01_2025-09-02.parquet").exists());
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(1800));
        assert!(cache.load(&key()).unwrap().is_none());
    }

    #[test]
    fn expired_entry_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(1800));
        cache.write(&key(), &sample_series()).unwrap();

        let later = Utc::now() + chrono::Duration::minutes(31);
        assert!(cache.load_at(&key(), later).unwrap().is_none());
        assert!(cache.get_meta(&key()).is_none());
    }

    #[test]
    fn corrupt_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(1800));
        cache.write(&key(), &sample_series()).unwrap();

        let path = cache.data_path(&key());
        fs::write(&path, b"not parquet").unwrap();

        assert!(cache.load(&key()).unwrap().is_none());
        assert!(path.with_extension("parquet.quarantined").exists());
    }

    #[test]
    fn age_comes_from_sidecar_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(1800));
        cache.write(&key(), &sample_series()).unwrap();

        let cached_at = cache.get_meta(&key()).unwrap().cached_at;
        let later = cached_at + chrono::Duration::minutes(20);
        let entry = cache.load_at(&key(), later).unwrap().unwrap();
        assert_eq!(entry.age, Duration::from_secs(20 * 60));

        let earlier = cached_at - chrono::Duration::minutes(5);
        assert_eq!(cache.load_at(&key(), earlier).unwrap().unwrap().age, Duration::ZERO);
    }

    #[test]
    fn failed_quarantine_still_drops_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(1800));
        cache.write(&key(), &sample_series()).unwrap();

        let path = cache.data_path(&key());
        fs::write(&path, b"not parquet").unwrap();
        // A non-empty directory in the way makes the rename fail
        let blocker = path.with_extension("parquet.quarantined");
        fs::create_dir_all(blocker.join("occupied")).unwrap();

        assert!(cache.load(&key()).unwrap().is_none());
        assert!(path.exists());
        assert!(cache.get_meta(&key()).is_none());
        assert!(cache.load(&key()).unwrap().is_none());
    }

    #[test]
    fn clear_only_removes_symbol_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(1800));
        cache.write(&key(), &sample_series()).unwrap();
        fs::create_dir_all(dir.path().join("keep-me")).unwrap();

        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.load(&key()).unwrap().is_none());
        assert!(dir.path().join("keep-me").exists());
    }

    #[test]
    fn empty_series_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(1800));
        let empty = NormalizedSeries {
            symbol: "SBIN".into(),
            records: Vec::new(),
        };
        assert!(matches!(cache.write(&key(), &empty), Err(DataError::CacheError(_))));
    }

    #[test]
    fn dataframe_has_one_column_per_field() {
        let df = sample_series().to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), COLUMNS.len());
        assert_eq!(df.column("open").unwrap().null_count(), 1);
    }
}
