//! In-memory key/value cache with per-entry expiry.
//!
//! Values are stored as JSON so one store serves every record type; typed
//! access round-trips through serde. Expiry is evaluated lazily at read
//! time and entries are only ever replaced wholesale.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Cache statistics reported through the health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed read recorded in the hit/miss counters. An expired entry
    /// counts as absent and is evicted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.peek(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Typed read that bypasses the counters, for re-probes of a key whose
    /// lookup was already recorded. Expired entries are still evicted.
    pub fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Utc::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_valid(now) => {
                serde_json::from_value(entry.value.clone()).ok()
            }
            Some(entry) => {
                drop(entry);
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Write-through. Storing an existing key replaces the value and
    /// resets the TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        let expires_at = Utc::now()
            + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(60));
        self.entries.insert(key.to_string(), CacheEntry { value: json, expires_at });
    }

    /// True when a non-expired entry exists. Does not touch the counters.
    pub fn has(&self, key: &str) -> bool {
        let now = Utc::now();
        self.entries
            .get(key)
            .map(|entry| entry.is_valid(now))
            .unwrap_or(false)
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Multi-key lookup with partial-hit semantics.
    ///
    /// `resolve_missing` is invoked at most once, with every requested key
    /// that has no valid entry (expired entries count as missing). Resolved
    /// values are merged into the store under `ttl` and the union of hits
    /// and resolutions, restricted to the requested keys, is returned. A
    /// key the resolver could not produce is simply absent from the result.
    pub async fn batch_get<T, F, Fut>(
        &self,
        keys: &[String],
        ttl: Duration,
        resolve_missing: F,
    ) -> HashMap<String, T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = HashMap<String, T>>,
    {
        let mut found: HashMap<String, T> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();

        for key in keys {
            match self.get::<T>(key) {
                Some(value) => {
                    found.insert(key.clone(), value);
                }
                None => missing.push(key.clone()),
            }
        }

        if missing.is_empty() {
            return found;
        }

        tracing::debug!(
            hits = found.len(),
            misses = missing.len(),
            "batch_get resolving misses"
        );

        let resolved = resolve_missing(missing).await;
        for (key, value) in resolved {
            self.set(&key, &value, ttl);
            found.insert(key, value);
        }

        found
    }
}
