//! Response caching for the data collaborators
//!
//! A [`CacheStore`] maps a [`CacheKey`] to opaque bytes. The cached sources
//! wrap any [`BarSource`] or [`RosterSource`], encode responses as JSON and
//! only ever cache non-empty responses, so a failed fetch is retried on the
//! next call.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::bar::RawBar;
use crate::source::{BarSource, Periodicity, RosterEntry, RosterSource};
use crate::{AnalysisError, Result};

// ============================================================
// KEYS AND STORES
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Bars fetched on `date` (`YYYYMMDD`). Bars change daily, so the fetch
    /// date is part of the key.
    pub fn for_bars(date: &str, symbol: &str, periodicity: Periodicity, count: usize) -> Self {
        Self(format!("bars/{date}/{symbol}/{periodicity}/{count}"))
    }

    /// Roster of `date`; a past date's roster never changes.
    pub fn for_roster(date: &str) -> Self {
        Self(format!("roster/{date}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Thread-safe key to bytes store. Concurrent writes to one key must not
/// interleave.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>>;
    fn put(&self, key: &CacheKey, value: Vec<u8>) -> Result<()>;
}

/// Process-local [`CacheStore`]
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written entry.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    fn put(&self, key: &CacheKey, value: Vec<u8>) -> Result<()> {
        self.lock().insert(key.clone(), value);
        Ok(())
    }
}

fn read_cached<T: DeserializeOwned, C: CacheStore + ?Sized>(cache: &C, key: &CacheKey) -> Option<T> {
    let bytes = cache.get(key)?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => {
            debug!(key = key.as_str(), "Cache hit");
            Some(value)
        }
        Err(error) => {
            warn!(%error, key = key.as_str(), "Discarding undecodable cache entry");
            None
        }
    }
}

fn write_cached<T: Serialize + ?Sized, C: CacheStore + ?Sized>(cache: &C, key: &CacheKey, value: &T) {
    let stored = serde_json::to_vec(value)
        .map_err(|e| AnalysisError::Cache(e.to_string()))
        .and_then(|bytes| cache.put(key, bytes));
    if let Err(error) = stored {
        warn!(%error, key = key.as_str(), "Cache write failed");
    }
}

fn today() -> String {
    Local::now().format("%Y%m%d").to_string()
}

// ============================================================
// CACHED SOURCES
// ============================================================

/// [`BarSource`] that serves repeated requests of the same day from a cache
pub struct CachedBarSource<S, C> {
    inner: S,
    cache: C,
    date: String,
}

impl<S: BarSource, C: CacheStore> CachedBarSource<S, C> {
    /// Cache entries are keyed by `date` (`YYYYMMDD`).
    pub fn new(inner: S, cache: C, date: impl Into<String>) -> Self {
        Self {
            inner,
            cache,
            date: date.into(),
        }
    }

    /// Keyed by the local calendar date.
    pub fn for_today(inner: S, cache: C) -> Self {
        Self::new(inner, cache, today())
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }
}

impl<S: BarSource, C: CacheStore> BarSource for CachedBarSource<S, C> {
    fn fetch_bars(&self, symbol: &str, periodicity: Periodicity, count: usize) -> Vec<RawBar> {
        let key = CacheKey::for_bars(&self.date, symbol, periodicity, count);
        if let Some(records) = read_cached(&self.cache, &key) {
            return records;
        }

        let records = self.inner.fetch_bars(symbol, periodicity, count);
        if !records.is_empty() {
            write_cached(&self.cache, &key, &records);
        }
        records
    }
}

/// [`RosterSource`] that caches each date's roster
pub struct CachedRosterSource<S, C> {
    inner: S,
    cache: C,
}

impl<S: RosterSource, C: CacheStore> CachedRosterSource<S, C> {
    pub fn new(inner: S, cache: C) -> Self {
        Self { inner, cache }
    }
}

impl<S: RosterSource, C: CacheStore> RosterSource for CachedRosterSource<S, C> {
    fn fetch_roster(&self, date: &str) -> Vec<RosterEntry> {
        let key = CacheKey::for_roster(date);
        if let Some(entries) = read_cached(&self.cache, &key) {
            return entries;
        }

        let entries = self.inner.fetch_roster(date);
        if !entries.is_empty() {
            write_cached(&self.cache, &key, &entries);
        }
        entries
    }
}
