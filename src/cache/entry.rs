//! Entry and statistics types for the in-process caches.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A cached value and the moment it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
  pub value: V,
  pub last_updated: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
  pub fn new(value: V, last_updated: DateTime<Utc>) -> Self {
    Self {
      value,
      last_updated,
    }
  }

  /// Valid while `now - last_updated <= ttl`.
  pub fn is_valid(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - self.last_updated <= ttl
  }
}

/// Snapshot of a cache's contents and hit ratio.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
  pub name: &'static str,
  pub count: usize,
  pub hits: u64,
  pub misses: u64,
  /// Hits over lookups, 0.0 before the first lookup.
  pub hit_rate: f64,
  pub oldest: Option<DateTime<Utc>>,
  pub newest: Option<DateTime<Utc>>,
}

/// What a cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cleanup {
  pub expired: usize,
  pub evicted: usize,
}
