//! In-memory TTL cache of normalized series, keyed by query.
//!
//! Entry lifecycle: absent → present (on insert) → expired (TTL elapsed) →
//! absent (evicted on the next lookup, by `purge_expired`, or by `clear`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::{NormalizedSeries, QueryKey};

#[derive(Debug, Clone)]
struct CacheEntry {
    series: Arc<NormalizedSeries>,
    created_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Query-keyed cache with a fixed time-to-live.
///
/// Not synchronized; the session wraps it in its own lock.
#[derive(Debug)]
pub struct SeriesCache {
    entries: HashMap<QueryKey, CacheEntry>,
    ttl: Duration,
}

impl SeriesCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `key`, evicting it if it has expired.
    pub fn get(&mut self, key: &QueryKey) -> Option<Arc<NormalizedSeries>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &QueryKey, now: Instant) -> Option<Arc<NormalizedSeries>> {
        let expired = self.entries.get(key)?.is_expired(self.ttl, now);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| Arc::clone(&e.series))
    }

    /// Store `series` under `key`, replacing any previous entry.
    pub fn insert(&mut self, key: QueryKey, series: Arc<NormalizedSeries>) {
        self.insert_at(key, series, Instant::now());
    }

    pub fn insert_at(&mut self, key: QueryKey, series: Arc<NormalizedSeries>, now: Instant) {
        self.entries.insert(
            key,
            CacheEntry {
                series,
                created_at: now,
            },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| !entry.is_expired(ttl, now));
        before - self.entries.len()
    }

    /// Drop every entry regardless of age.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
