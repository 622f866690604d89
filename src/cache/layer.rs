//! TTL key/value store with oldest-first eviction.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::entry::{CacheEntry, CacheStats, Cleanup};

struct Inner<V> {
  entries: HashMap<String, CacheEntry<V>>,
  hits: u64,
  misses: u64,
}

/// Cache layer keyed by string.
///
/// Reads of expired entries behave like misses and drop the entry. The
/// number of entries never exceeds `max_entries`: a write that would go over
/// the cap evicts the entries with the oldest `last_updated` first.
///
/// The mutex is only held for synchronous bookkeeping, never across an
/// `.await`, so callers on one task never contend on it.
pub struct CacheLayer<V> {
  name: &'static str,
  ttl: Duration,
  max_entries: usize,
  inner: Mutex<Inner<V>>,
}

impl<V: Clone> CacheLayer<V> {
  pub fn new(name: &'static str, ttl: Duration, max_entries: usize) -> Self {
    Self {
      name,
      ttl,
      max_entries: max_entries.max(1),
      inner: Mutex::new(Inner {
        entries: HashMap::new(),
        hits: 0,
        misses: 0,
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner<V>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn get(&self, key: &str) -> Option<V> {
    self.get_at(key, Utc::now())
  }

  /// Look up `key` as of `now`, removing it if it has expired.
  pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
    let mut inner = self.lock();

    let valid = match inner.entries.get(key) {
      Some(entry) => entry.is_valid(now, self.ttl),
      None => {
        inner.misses += 1;
        return None;
      }
    };

    if !valid {
      inner.entries.remove(key);
      inner.misses += 1;
      debug!(cache = self.name, key, "expired entry dropped on read");
      return None;
    }

    inner.hits += 1;
    inner.entries.get(key).map(|e| e.value.clone())
  }

  pub fn set(&self, key: impl Into<String>, value: V) {
    self.set_at(key, value, Utc::now());
  }

  /// Store `value` stamped with `now`, overwriting any previous entry.
  pub fn set_at(&self, key: impl Into<String>, value: V, now: DateTime<Utc>) {
    let mut inner = self.lock();
    inner.entries.insert(key.into(), CacheEntry::new(value, now));
    let evicted = evict_oldest(&mut inner.entries, self.max_entries);
    if evicted > 0 {
      debug!(cache = self.name, evicted, "evicted oldest entries over capacity");
    }
  }

  /// Drop every entry. Hit/miss counters are kept.
  pub fn clear(&self) {
    self.lock().entries.clear();
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  /// First non-`None` result of `f` over the entries still valid now.
  ///
  /// Does not count as a hit or miss.
  pub fn find_map<R>(&self, f: impl FnMut(&str, &V) -> Option<R>) -> Option<R> {
    self.find_map_at(Utc::now(), f)
  }

  pub fn find_map_at<R>(
    &self,
    now: DateTime<Utc>,
    mut f: impl FnMut(&str, &V) -> Option<R>,
  ) -> Option<R> {
    let inner = self.lock();
    inner
      .entries
      .iter()
      .filter(|(_, e)| e.is_valid(now, self.ttl))
      .find_map(|(k, e)| f(k, &e.value))
  }

  pub fn cleanup(&self) -> Cleanup {
    self.cleanup_at(Utc::now())
  }

  /// Remove every expired entry, then evict oldest entries until the cache
  /// is at or below its cap.
  pub fn cleanup_at(&self, now: DateTime<Utc>) -> Cleanup {
    let mut inner = self.lock();
    let before = inner.entries.len();
    inner.entries.retain(|_, e| e.is_valid(now, self.ttl));
    let expired = before - inner.entries.len();
    let evicted = evict_oldest(&mut inner.entries, self.max_entries);

    if expired > 0 || evicted > 0 {
      debug!(cache = self.name, expired, evicted, "cache cleanup");
    }

    Cleanup { expired, evicted }
  }

  pub fn stats(&self) -> CacheStats {
    let inner = self.lock();
    let lookups = inner.hits + inner.misses;
    CacheStats {
      name: self.name,
      count: inner.entries.len(),
      hits: inner.hits,
      misses: inner.misses,
      hit_rate: if lookups == 0 {
        0.0
      } else {
        inner.hits as f64 / lookups as f64
      },
      oldest: inner.entries.values().map(|e| e.last_updated).min(),
      newest: inner.entries.values().map(|e| e.last_updated).max(),
    }
  }
}

/// Remove entries with the oldest `last_updated` until `entries.len() <= cap`.
fn evict_oldest<V>(entries: &mut HashMap<String, CacheEntry<V>>, cap: usize) -> usize {
  let excess = entries.len().saturating_sub(cap);
  if excess == 0 {
    return 0;
  }

  let mut by_age: Vec<(DateTime<Utc>, String)> = entries
    .iter()
    .map(|(k, e)| (e.last_updated, k.clone()))
    .collect();
  by_age.sort();

  for (_, key) in by_age.into_iter().take(excess) {
    entries.remove(&key);
  }

  excess
}
