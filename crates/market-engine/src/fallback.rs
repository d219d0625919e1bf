//! Primary/fallback call orchestration with write-through caching.
//!
//! One executor instance is shared by every engine operation. It consults
//! the cache first, retries the primary on failure when configured, then
//! consults the fallback, and annotates the returned envelope with which
//! source actually answered. Errors are always recovered into failure
//! envelopes; nothing propagates to the caller.

use dashmap::DashMap;
use market_core::{EmptyPayload, ResponseEnvelope, ResponseMeta};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::cache::CacheStore;

/// Source identifier annotated on cache-served envelopes
pub const CACHE_SOURCE: &str = "cache";

pub struct FallbackExecutor {
    cache: Arc<CacheStore>,
    cache_enabled: bool,
    cache_ttl: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    /// Per-key guards so concurrent misses on one key collapse into a
    /// single upstream call; the loser re-checks the cache.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl FallbackExecutor {
    pub fn new(
        cache: Arc<CacheStore>,
        cache_enabled: bool,
        cache_ttl: Duration,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            cache,
            cache_enabled,
            cache_ttl,
            retry_attempts,
            retry_delay,
            inflight: DashMap::new(),
        }
    }

    /// Resolve one lookup through cache, primary, and optional fallback.
    ///
    /// `primary` is a factory so the retry loop can re-invoke it; the
    /// fallback is consulted at most once. A successful envelope with an
    /// empty collection payload counts as a miss worth falling back on.
    pub async fn execute<T, P, PF, F, FF>(
        &self,
        cache_key: Option<&str>,
        primary: P,
        fallback: Option<F>,
    ) -> ResponseEnvelope<T>
    where
        T: Clone + Serialize + DeserializeOwned + EmptyPayload,
        P: Fn() -> PF,
        PF: Future<Output = ResponseEnvelope<T>>,
        F: FnOnce() -> FF,
        FF: Future<Output = ResponseEnvelope<T>>,
    {
        let key = cache_key.filter(|_| self.cache_enabled);

        if let Some(key) = key {
            if let Some(hit) = self.cached(key) {
                return hit;
            }

            // Single-flight: serialize concurrent misses on this key
            let guard = self
                .inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let _lock = guard.lock().await;

            // A concurrent caller may have resolved the key while we waited.
            // This re-probe belongs to the lookup already counted above, so
            // it reads past the counters.
            if let Some(value) = self.cache.peek::<T>(key) {
                drop(_lock);
                self.release_guard(key, &guard);
                tracing::debug!(key, "cache hit after in-flight wait");
                return ResponseEnvelope::ok(value, CACHE_SOURCE).with_cached(true);
            }

            let envelope = self.resolve(key, primary, fallback).await;
            drop(_lock);
            self.release_guard(key, &guard);
            return envelope;
        }

        self.resolve_uncached(primary, fallback).await
    }

    fn cached<T: Clone + DeserializeOwned>(&self, key: &str) -> Option<ResponseEnvelope<T>> {
        let value: T = self.cache.get(key)?;
        tracing::debug!(key, "cache hit");
        Some(ResponseEnvelope::ok(value, CACHE_SOURCE).with_cached(true))
    }

    fn release_guard(&self, key: &str, guard: &Arc<Mutex<()>>) {
        // Drop the map entry once no other caller is waiting on it
        if Arc::strong_count(guard) <= 2 {
            self.inflight.remove_if(key, |_, v| Arc::strong_count(v) <= 2);
        }
    }

    async fn resolve<T, P, PF, F, FF>(
        &self,
        key: &str,
        primary: P,
        fallback: Option<F>,
    ) -> ResponseEnvelope<T>
    where
        T: Clone + Serialize + DeserializeOwned + EmptyPayload,
        P: Fn() -> PF,
        PF: Future<Output = ResponseEnvelope<T>>,
        F: FnOnce() -> FF,
        FF: Future<Output = ResponseEnvelope<T>>,
    {
        let envelope = self.resolve_uncached(primary, fallback).await;
        // Only non-empty successes are worth serving from cache; an empty
        // collection must re-consult the sources on the next call
        if envelope.success {
            if let Some(data) = envelope.data.as_ref().filter(|d| !d.is_empty_payload()) {
                self.cache.set(key, data, self.cache_ttl);
            }
        }
        envelope
    }

    async fn resolve_uncached<T, P, PF, F, FF>(
        &self,
        primary: P,
        fallback: Option<F>,
    ) -> ResponseEnvelope<T>
    where
        T: Clone + EmptyPayload,
        P: Fn() -> PF,
        PF: Future<Output = ResponseEnvelope<T>>,
        F: FnOnce() -> FF,
        FF: Future<Output = ResponseEnvelope<T>>,
    {
        let primary_env = self.call_primary(primary).await;

        if primary_env.success
            && primary_env
                .data
                .as_ref()
                .is_some_and(|d| !d.is_empty_payload())
        {
            return primary_env;
        }

        let Some(fallback) = fallback else {
            return primary_env;
        };

        let primary_error = primary_env
            .error
            .clone()
            .unwrap_or_else(|| "primary returned no data".to_string());
        tracing::info!(
            source = %primary_env.source,
            error = %primary_error,
            "primary source failed, consulting fallback"
        );

        let fallback_env = fallback().await;
        if fallback_env.success
            && fallback_env
                .data
                .as_ref()
                .is_some_and(|d| !d.is_empty_payload())
        {
            return fallback_env.with_meta(ResponseMeta {
                fallback: true,
                primary_error: Some(primary_error),
                fallback_error: None,
            });
        }

        // Both failed: the primary's error is authoritative
        let fallback_error = fallback_env
            .error
            .or_else(|| Some("fallback returned no data".to_string()));
        primary_env.with_meta(ResponseMeta {
            fallback: false,
            primary_error: Some(primary_error),
            fallback_error,
        })
    }

    /// Invoke the primary, retrying failures up to the configured number
    /// of extra attempts. Success-with-empty-payload is not transient and
    /// is not retried.
    async fn call_primary<T, P, PF>(&self, primary: P) -> ResponseEnvelope<T>
    where
        P: Fn() -> PF,
        PF: Future<Output = ResponseEnvelope<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let envelope = primary().await;
            if envelope.success || attempt >= self.retry_attempts {
                return envelope;
            }
            attempt += 1;
            tracing::debug!(
                attempt,
                max = self.retry_attempts,
                "primary call failed, retrying"
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
