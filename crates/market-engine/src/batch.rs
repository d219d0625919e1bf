//! Chunked, rate-limit-aware bulk resolution.
//!
//! Cache hits are served immediately through `CacheStore::batch_get`; only
//! the misses go upstream, in fixed-size chunks resolved concurrently
//! within a chunk and strictly sequentially across chunks, with a pacing
//! delay between consecutive chunks.

use futures::future::join_all;
use market_core::ResponseEnvelope;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::cache::CacheStore;

/// Outcome of a bulk fetch. Identifiers that failed to resolve are simply
/// absent from `items`; a missing key means "unresolved", not an error.
#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    pub items: HashMap<String, T>,
    pub success_count: usize,
    pub error_count: usize,
}

pub struct BatchFetcher {
    chunk_size: usize,
    chunk_delay: Duration,
}

impl BatchFetcher {
    pub fn new(chunk_size: usize, chunk_delay: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_delay,
        }
    }

    /// Resolve many identifiers, consulting the cache first.
    ///
    /// `cache_key` derives the cache key for one identifier; `fetch`
    /// resolves one identifier upstream (typically through the fallback
    /// executor). One identifier's failure never fails the batch.
    pub async fn fetch_many<T, K, F, Fut>(
        &self,
        cache: &CacheStore,
        ttl: Duration,
        ids: &[String],
        cache_key: K,
        fetch: F,
    ) -> BatchResult<T>
    where
        T: Serialize + DeserializeOwned + Clone,
        K: Fn(&str) -> String,
        F: Fn(String) -> Fut,
        Fut: Future<Output = ResponseEnvelope<T>>,
    {
        let keys: Vec<String> = ids.iter().map(|id| cache_key(id)).collect();
        let id_by_key: HashMap<String, String> = keys
            .iter()
            .cloned()
            .zip(ids.iter().cloned())
            .collect();

        let id_lookup = &id_by_key;
        let fetch_one = &fetch;
        let resolved = cache
            .batch_get(&keys, ttl, |missing| async move {
                self.resolve_chunked(&missing, id_lookup, fetch_one).await
            })
            .await;

        let items: HashMap<String, T> = resolved
            .into_iter()
            .filter_map(|(key, value)| id_by_key.get(&key).map(|id| (id.clone(), value)))
            .collect();

        let success_count = items.len();
        let error_count = ids.len().saturating_sub(success_count);
        tracing::info!(
            requested = ids.len(),
            resolved = success_count,
            failed = error_count,
            "batch fetch complete"
        );

        BatchResult {
            items,
            success_count,
            error_count,
        }
    }

    /// Drive cache misses upstream chunk by chunk. Within a chunk every
    /// identifier resolves concurrently; chunks run strictly in order with
    /// the pacing delay between consecutive chunks (never inside one).
    async fn resolve_chunked<T, F, Fut>(
        &self,
        missing_keys: &[String],
        id_by_key: &HashMap<String, String>,
        fetch: &F,
    ) -> HashMap<String, T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = ResponseEnvelope<T>>,
    {
        let mut resolved = HashMap::new();

        for (index, chunk) in missing_keys.chunks(self.chunk_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.chunk_delay).await;
            }
            tracing::debug!(chunk = index, size = chunk.len(), "resolving batch chunk");

            let calls = chunk.iter().filter_map(|key| {
                let id = id_by_key.get(key)?.clone();
                let key = key.clone();
                Some(async move { (key, fetch(id).await) })
            });

            for (key, envelope) in join_all(calls).await {
                match envelope.data {
                    Some(value) if envelope.success => {
                        resolved.insert(key, value);
                    }
                    _ => {
                        tracing::warn!(
                            key,
                            error = envelope.error.as_deref().unwrap_or("no data"),
                            "batch item failed"
                        );
                    }
                }
            }
        }

        resolved
    }
}
