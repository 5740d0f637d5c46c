//! Fetch session: the cache/observability wrapper around the pipeline.
//!
//! A session owns its provider, its cache and its counters; nothing is
//! shared between sessions. Each call to [`FetchSession::fetch`] reports
//! whether the pipeline actually ran for that call ([`FetchSource::Fresh`])
//! or the result came from a cache tier ([`FetchSource::Cache`]).
//!
//! At most one pipeline call per key is in flight. A caller that finds its
//! key already being fetched waits for the leader and then reads the cache;
//! if the leader failed, one waiter takes over as the next leader.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use super::cache::SeriesCache;
use super::disk_cache::DiskCache;
use super::normalize;
use super::provider::{DailyRecordProvider, DataError};
use crate::domain::{NormalizedSeries, QueryKey};

/// Where a fetch result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// The pipeline ran and called the provider.
    Fresh,
    /// Served from a cache tier without calling the provider.
    Cache,
}

impl FetchSource {
    pub fn label(self) -> &'static str {
        match self {
            FetchSource::Fresh => "fresh",
            FetchSource::Cache => "cache",
        }
    }
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Session-scoped counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchStats {
    /// Pipeline invocations that succeeded this session.
    pub fresh_fetches: u64,
    pub last_source: Option<FetchSource>,
    /// Wall-clock time of the most recent pipeline call.
    pub last_latency: Option<Duration>,
}

struct SessionState {
    cache: SeriesCache,
    in_flight: HashSet<QueryKey>,
    stats: FetchStats,
}

/// Result of a load that bypassed the memory cache.
struct Loaded {
    series: Arc<NormalizedSeries>,
    source: FetchSource,
    /// When the series was produced; `None` if that predates the monotonic clock.
    created_at: Option<Instant>,
}

/// Clears a key's in-flight marker and wakes waiters when dropped.
struct InFlightGuard<'a, P: DailyRecordProvider> {
    session: &'a FetchSession<P>,
    key: &'a QueryKey,
}

impl<P: DailyRecordProvider> Drop for InFlightGuard<'_, P> {
    fn drop(&mut self) {
        self.session.lock().in_flight.remove(self.key);
        self.session.fetch_done.notify_all();
    }
}

/// Cache/observability wrapper around [`normalize::normalize`].
pub struct FetchSession<P: DailyRecordProvider> {
    provider: P,
    disk: Option<DiskCache>,
    state: Mutex<SessionState>,
    fetch_done: Condvar,
}

impl<P: DailyRecordProvider> FetchSession<P> {
    pub fn new(provider: P, ttl: Duration) -> Self {
        Self {
            provider,
            disk: None,
            state: Mutex::new(SessionState {
                cache: SeriesCache::new(ttl),
                in_flight: HashSet::new(),
                stats: FetchStats::default(),
            }),
            fetch_done: Condvar::new(),
        }
    }

    /// Add a Parquet tier consulted after the in-memory cache.
    pub fn with_disk_cache(mut self, disk: DiskCache) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Fetch the normalized series for `symbol` over `[from, to]`.
    pub fn fetch(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(Arc<NormalizedSeries>, FetchSource), DataError> {
        let key = QueryKey::new(symbol, from, to)?;
        self.fetch_key(&key)
    }

    pub fn fetch_key(
        &self,
        key: &QueryKey,
    ) -> Result<(Arc<NormalizedSeries>, FetchSource), DataError> {
        let mut state = self.lock();
        loop {
            if let Some(series) = state.cache.get(key) {
                state.stats.last_source = Some(FetchSource::Cache);
                tracing::debug!(%key, "served from memory cache");
                return Ok((series, FetchSource::Cache));
            }
            if !state.in_flight.contains(key) {
                break;
            }
            state = self
                .fetch_done
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        state.in_flight.insert(key.clone());
        drop(state);

        // Released on every exit path, including a panicking provider.
        let _in_flight = InFlightGuard { session: self, key };
        let loaded = self.load_uncached(key)?;

        let mut state = self.lock();
        match loaded.created_at {
            Some(created_at) => {
                state
                    .cache
                    .insert_at(key.clone(), Arc::clone(&loaded.series), created_at)
            }
            None => tracing::debug!(%key, "disk entry older than the monotonic clock, not promoted"),
        }
        if loaded.source == FetchSource::Fresh {
            state.stats.fresh_fetches += 1;
        }
        state.stats.last_source = Some(loaded.source);
        drop(state);
        Ok((loaded.series, loaded.source))
    }

    /// Disk tier, then the pipeline. Runs without the session lock held.
    fn load_uncached(&self, key: &QueryKey) -> Result<Loaded, DataError> {
        if let Some(disk) = &self.disk {
            match disk.load(key) {
                Ok(Some(entry)) => {
                    tracing::debug!(%key, age = ?entry.age, "served from disk cache");
                    // Keep the original write time so the memory copy expires with the disk one.
                    return Ok(Loaded {
                        series: Arc::new(entry.series),
                        source: FetchSource::Cache,
                        created_at: Instant::now().checked_sub(entry.age),
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(%key, error = %e, "disk cache read failed"),
            }
        }

        let started = Instant::now();
        let result = normalize::normalize(&self.provider, key);
        let elapsed = started.elapsed();
        self.lock().stats.last_latency = Some(elapsed);

        let series = match result {
            Ok(series) => series,
            Err(e) => {
                tracing::warn!(%key, error = %e, ?elapsed, "fetch failed");
                return Err(e);
            }
        };
        tracing::info!(
            %key,
            provider = self.provider.name(),
            records = series.len(),
            ?elapsed,
            "fetched fresh series"
        );

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.write(key, &series) {
                tracing::warn!(%key, error = %e, "disk cache write failed");
            }
        }
        Ok(Loaded {
            series: Arc::new(series),
            source: FetchSource::Fresh,
            created_at: Some(Instant::now()),
        })
    }

    /// Discard every cached series, in memory and on disk. Counters are kept.
    pub fn clear_cache(&self) {
        self.lock().cache.clear();
        if let Some(disk) = &self.disk {
            match disk.clear() {
                Ok(removed) => tracing::debug!(removed, "cleared disk cache"),
                Err(e) => tracing::warn!(error = %e, "failed to clear disk cache"),
            }
        }
    }

    /// Evict expired in-memory entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.lock().cache.purge_expired(Instant::now())
    }

    /// Snapshot of the session counters.
    pub fn stats(&self) -> FetchStats {
        self.lock().stats.clone()
    }

    pub fn cached_entries(&self) -> usize {
        self.lock().cache.len()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
