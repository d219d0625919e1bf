//! Engine facade: the typed query surface callers use.
//!
//! Holds the provider adapters keyed by source id, the shared cache, and
//! the executor/batch plumbing. Constructed once at process start and
//! shared by handle; there is no hidden global instance.

use futures::future::join_all;
use market_core::{
    validate_symbol, CompanyOverview, HealthReport, IndicatorKind, Interval, MarketDataProvider,
    MarketError, MarketStatus, NewsItem, Quote, ResponseEnvelope, SourceHealth, SymbolMatch,
    SymbolValidation, TechnicalIndicator, TimeSeries,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::batch::{BatchFetcher, BatchResult};
use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::fallback::FallbackExecutor;

/// Source identifier for envelopes produced by the engine itself
/// (validation failures, aggregate errors)
pub const ENGINE_SOURCE: &str = "engine";

/// Canonical symbol probed by the health check
const HEALTH_PROBE_SYMBOL: &str = "AAPL";

pub struct MarketDataEngine {
    config: EngineConfig,
    providers: HashMap<String, Arc<dyn MarketDataProvider>>,
    cache: Arc<CacheStore>,
    executor: FallbackExecutor,
    batch: BatchFetcher,
}

impl MarketDataEngine {
    /// Build an engine over externally constructed collaborators.
    /// Fails when a configured source id has no registered adapter.
    pub fn new(
        config: EngineConfig,
        providers: HashMap<String, Arc<dyn MarketDataProvider>>,
        cache: Arc<CacheStore>,
    ) -> Result<Self, MarketError> {
        if !providers.contains_key(&config.primary_source) {
            return Err(MarketError::UnknownSource(config.primary_source.clone()));
        }
        if let Some(fallback) = &config.fallback_source {
            if !providers.contains_key(fallback) {
                return Err(MarketError::UnknownSource(fallback.clone()));
            }
        }

        let executor = FallbackExecutor::new(
            Arc::clone(&cache),
            config.cache_enabled,
            config.cache_ttl,
            config.retry_attempts,
            config.retry_delay,
        );
        let batch = BatchFetcher::new(config.batch_chunk_size, config.batch_delay);

        tracing::info!(
            primary = %config.primary_source,
            fallback = config.fallback_source.as_deref().unwrap_or("none"),
            cache_enabled = config.cache_enabled,
            "market data engine initialized"
        );

        Ok(Self {
            config,
            providers,
            cache,
            executor,
            batch,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn primary(&self) -> &Arc<dyn MarketDataProvider> {
        &self.providers[&self.config.primary_source]
    }

    fn fallback(&self) -> Option<&Arc<dyn MarketDataProvider>> {
        self.config
            .fallback_source
            .as_ref()
            .and_then(|id| self.providers.get(id))
    }

    // -----------------------------------------------------------------
    // Query surface
    // -----------------------------------------------------------------

    pub async fn get_quote(&self, symbol: &str) -> ResponseEnvelope<Quote> {
        if let Err(e) = validate_symbol(symbol) {
            return ResponseEnvelope::err(e.to_string(), ENGINE_SOURCE);
        }
        self.resolve_quote(symbol).await
    }

    /// Bulk quote resolution with cache partial hits, chunking, and
    /// pacing. Invalid symbols are rejected up front and reported in
    /// `error_count`; they never reach an adapter.
    pub async fn get_multiple_quotes(&self, symbols: &[String]) -> BatchResult<Quote> {
        let (valid, invalid): (Vec<String>, Vec<String>) = symbols
            .iter()
            .cloned()
            .partition(|s| validate_symbol(s).is_ok());

        for symbol in &invalid {
            tracing::warn!(symbol, "skipping invalid symbol in batch");
        }

        let mut result = self
            .batch
            .fetch_many(
                &self.cache,
                self.config.cache_ttl,
                &valid,
                quote_key,
                |symbol: String| async move { self.fetch_quote(&symbol).await },
            )
            .await;

        result.error_count += invalid.len();
        result
    }

    pub async fn get_series(&self, symbol: &str, interval: Interval) -> ResponseEnvelope<TimeSeries> {
        if let Err(e) = validate_symbol(symbol) {
            return ResponseEnvelope::err(e.to_string(), ENGINE_SOURCE);
        }
        let key = format!("series:{}:{}", symbol, interval.tag());
        let fallback = self.fallback();
        self.executor
            .execute(
                Some(&key),
                || self.primary().get_series(symbol, interval),
                fallback.map(|p| move || p.get_series(symbol, interval)),
            )
            .await
    }

    pub async fn get_overview(&self, symbol: &str) -> ResponseEnvelope<CompanyOverview> {
        if let Err(e) = validate_symbol(symbol) {
            return ResponseEnvelope::err(e.to_string(), ENGINE_SOURCE);
        }
        let key = format!("overview:{}", symbol);
        let fallback = self.fallback();
        self.executor
            .execute(
                Some(&key),
                || self.primary().get_overview(symbol),
                fallback.map(|p| move || p.get_overview(symbol)),
            )
            .await
    }

    pub async fn get_news(
        &self,
        tickers: Option<&[String]>,
        topics: Option<&[String]>,
        limit: u32,
    ) -> ResponseEnvelope<Vec<NewsItem>> {
        if let Some(tickers) = tickers {
            for ticker in tickers {
                if let Err(e) = validate_symbol(ticker) {
                    return ResponseEnvelope::err(e.to_string(), ENGINE_SOURCE);
                }
            }
        }

        let key = format!(
            "news:{}:{}:{}",
            tickers.map(|t| t.join(",")).unwrap_or_else(|| "all".to_string()),
            topics.map(|t| t.join(",")).unwrap_or_else(|| "all".to_string()),
            limit
        );
        let fallback = self.fallback();
        self.executor
            .execute(
                Some(&key),
                || self.primary().get_news(tickers, topics, limit),
                fallback.map(|p| move || p.get_news(tickers, topics, limit)),
            )
            .await
    }

    pub async fn get_indicator(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        interval: Interval,
        period: u32,
    ) -> ResponseEnvelope<TechnicalIndicator> {
        if let Err(e) = validate_symbol(symbol) {
            return ResponseEnvelope::err(e.to_string(), ENGINE_SOURCE);
        }
        let key = format!(
            "technical:{}:{}:{}:{}",
            symbol,
            kind.name(),
            interval.tag(),
            period
        );
        let fallback = self.fallback();
        self.executor
            .execute(
                Some(&key),
                || self.primary().get_indicator(symbol, kind, interval, period),
                fallback.map(|p| move || p.get_indicator(symbol, kind, interval, period)),
            )
            .await
    }

    pub async fn get_market_status(&self) -> ResponseEnvelope<MarketStatus> {
        let fallback = self.fallback();
        self.executor
            .execute(
                Some("market_status"),
                || self.primary().get_status(),
                fallback.map(|p| move || p.get_status()),
            )
            .await
    }

    pub async fn search_symbol(&self, keywords: &str) -> ResponseEnvelope<Vec<SymbolMatch>> {
        let keywords = keywords.trim();
        if keywords.is_empty() {
            return ResponseEnvelope::err("search keywords are empty", ENGINE_SOURCE);
        }
        let key = format!("search:{}", keywords.to_lowercase());
        let fallback = self.fallback();
        self.executor
            .execute(
                Some(&key),
                || self.primary().search(keywords),
                fallback.map(|p| move || p.search(keywords)),
            )
            .await
    }

    /// Format gate first, then a cached search probe requiring an exact
    /// symbol match. A malformed symbol is a successful validation with
    /// `valid = false`, not an error.
    pub async fn validate_symbol(&self, symbol: &str) -> ResponseEnvelope<SymbolValidation> {
        if let Err(e) = validate_symbol(symbol) {
            return ResponseEnvelope::ok(
                SymbolValidation {
                    symbol: symbol.to_string(),
                    valid: false,
                    reason: Some(e.to_string()),
                },
                ENGINE_SOURCE,
            );
        }

        let search = self.search_symbol(symbol).await;
        match search.data {
            Some(matches) if search.success => {
                let valid = matches.iter().any(|m| m.symbol == symbol);
                ResponseEnvelope::ok(
                    SymbolValidation {
                        symbol: symbol.to_string(),
                        valid,
                        reason: (!valid).then(|| "no exact match from upstream".to_string()),
                    },
                    search.source,
                )
            }
            _ => ResponseEnvelope::err(
                search
                    .error
                    .unwrap_or_else(|| "symbol search failed".to_string()),
                search.source,
            ),
        }
    }

    /// Probe a canonical symbol against every configured adapter and
    /// report per-source reachability plus cache statistics. Probes go
    /// straight to the adapters, bypassing cache and fallback.
    pub async fn health_check(&self) -> HealthReport {
        let probes = self.providers.iter().map(|(id, provider)| {
            let id = id.clone();
            async move {
                let envelope = provider.get_quote(HEALTH_PROBE_SYMBOL).await;
                SourceHealth {
                    source: id,
                    reachable: envelope.success,
                    error: envelope.error,
                }
            }
        });

        let mut sources = join_all(probes).await;
        sources.sort_by(|a, b| a.source.cmp(&b.source));

        let stats = self.cache.stats();
        HealthReport {
            sources,
            cache_entries: stats.entries,
            cache_hits: stats.hits,
            cache_misses: stats.misses,
            timestamp: chrono::Utc::now(),
        }
    }

    // -----------------------------------------------------------------
    // Internal resolution
    // -----------------------------------------------------------------

    pub(crate) async fn resolve_quote(&self, symbol: &str) -> ResponseEnvelope<Quote> {
        let key = quote_key(symbol);
        let fallback = self.fallback();
        self.executor
            .execute(
                Some(&key),
                || self.primary().get_quote(symbol),
                fallback.map(|p| move || p.get_quote(symbol)),
            )
            .await
    }

    /// Quote resolution for the batch path. `batch_get` has already served
    /// the cache hits, recorded the misses, and merges resolved values back
    /// into the store, so this call goes straight to the sources.
    pub(crate) async fn fetch_quote(&self, symbol: &str) -> ResponseEnvelope<Quote> {
        let fallback = self.fallback();
        self.executor
            .execute(
                None,
                || self.primary().get_quote(symbol),
                fallback.map(|p| move || p.get_quote(symbol)),
            )
            .await
    }
}

pub(crate) fn quote_key(symbol: &str) -> String {
    format!("quote:{}", symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::CACHE_SOURCE;
    use crate::testutil::{build_engine, engine_config, StubProvider};
    use std::time::Duration;

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_quote_resolves_and_caches() {
        let primary = Arc::new(StubProvider::new("av"));
        let engine = build_engine(engine_config("av", None), &primary, None);

        let first = engine.get_quote("AAPL").await;
        assert!(first.success);
        assert!(!first.cached);
        assert_eq!(first.source, "av");
        let quote = first.data.unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert!((quote.price - 150.25).abs() < 1e-9);
        assert!((quote.change_percent - (2.50 / 147.75 * 100.0)).abs() < 1e-9);

        let second = engine.get_quote("AAPL").await;
        assert!(second.success);
        assert!(second.cached);
        assert_eq!(second.source, CACHE_SOURCE);
        assert!((second.data.unwrap().price - 150.25).abs() < 1e-9);
        assert_eq!(primary.quote_call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_refetches() {
        let primary = Arc::new(StubProvider::new("av"));
        let mut config = engine_config("av", None);
        config.cache_enabled = false;
        let engine = build_engine(config, &primary, None);

        let first = engine.get_quote("AAPL").await;
        let second = engine.get_quote("AAPL").await;
        assert!(!first.cached);
        assert!(!second.cached);
        assert_eq!(primary.quote_call_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_expiry_refetches() {
        let primary = Arc::new(StubProvider::new("av"));
        let mut config = engine_config("av", None);
        config.cache_ttl = Duration::from_millis(30);
        let engine = build_engine(config, &primary, None);

        engine.get_quote("AAPL").await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let second = engine.get_quote("AAPL").await;

        assert!(!second.cached);
        assert_eq!(primary.quote_call_count(), 2);
    }

    #[tokio::test]
    async fn test_fallback_rescues_primary_failure() {
        let primary = Arc::new(StubProvider::new("av").failing());
        let secondary = Arc::new(StubProvider::new("yahoo").with_price(150.10));
        let engine = build_engine(engine_config("av", Some("yahoo")), &primary, Some(&secondary));

        let envelope = engine.get_quote("AAPL").await;
        assert!(envelope.success);
        assert_eq!(envelope.source, "yahoo");
        let meta = envelope.meta.as_ref().unwrap();
        assert!(meta.fallback);
        assert!(meta.primary_error.as_deref().unwrap().contains("quote unavailable"));
        assert!(meta.fallback_error.is_none());

        // The rescued result is cached like any other
        let again = engine.get_quote("AAPL").await;
        assert!(again.cached);
        assert_eq!(primary.quote_call_count(), 1);
        assert_eq!(secondary.quote_call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_on_empty_payload() {
        let primary = Arc::new(StubProvider::new("av").with_empty_news());
        let secondary = Arc::new(StubProvider::new("yahoo"));
        let engine = build_engine(engine_config("av", Some("yahoo")), &primary, Some(&secondary));

        let envelope = engine.get_news(None, None, 5).await;
        assert!(envelope.success);
        assert_eq!(envelope.source, "yahoo");
        assert!(envelope.meta.as_ref().unwrap().fallback);
        assert!(!envelope.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let primary = Arc::new(StubProvider::new("av").with_empty_news());
        let engine = build_engine(engine_config("av", None), &primary, None);

        let first = engine.get_news(None, None, 5).await;
        assert!(first.success);
        assert!(first.data.unwrap().is_empty());

        // An empty list must re-consult the source, not serve from cache
        let second = engine.get_news(None, None, 5).await;
        assert!(!second.cached);
        assert_eq!(primary.news_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_both_sources_failing() {
        let primary = Arc::new(StubProvider::new("av").failing());
        let secondary = Arc::new(StubProvider::new("yahoo").failing());
        let engine = build_engine(engine_config("av", Some("yahoo")), &primary, Some(&secondary));

        let envelope = engine.get_quote("AAPL").await;
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.source, "av");
        assert!(envelope.error.as_deref().unwrap().contains("av"));
        let meta = envelope.meta.as_ref().unwrap();
        assert!(!meta.fallback);
        assert!(meta.primary_error.is_some());
        assert!(meta.fallback_error.as_deref().unwrap().contains("yahoo"));
    }

    #[tokio::test]
    async fn test_no_fallback_configured() {
        let primary = Arc::new(StubProvider::new("av").failing());
        let engine = build_engine(engine_config("av", None), &primary, None);

        let envelope = engine.get_quote("AAPL").await;
        assert!(!envelope.success);
        assert_eq!(envelope.source, "av");
        assert!(envelope.meta.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_transient_failures() {
        let primary = Arc::new(StubProvider::new("av").with_fail_next_quotes(2));
        let secondary = Arc::new(StubProvider::new("yahoo"));
        let mut config = engine_config("av", Some("yahoo"));
        config.retry_attempts = 2;
        let engine = build_engine(config, &primary, Some(&secondary));

        let envelope = engine.get_quote("AAPL").await;
        assert!(envelope.success);
        assert_eq!(envelope.source, "av");
        assert!(envelope.meta.is_none());
        assert_eq!(primary.quote_call_count(), 3);
        assert_eq!(secondary.quote_call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_falls_back() {
        let primary = Arc::new(StubProvider::new("av").with_fail_next_quotes(10));
        let secondary = Arc::new(StubProvider::new("yahoo"));
        let mut config = engine_config("av", Some("yahoo"));
        config.retry_attempts = 1;
        let engine = build_engine(config, &primary, Some(&secondary));

        let envelope = engine.get_quote("AAPL").await;
        assert!(envelope.success);
        assert_eq!(envelope.source, "yahoo");
        assert!(envelope.meta.as_ref().unwrap().fallback);
        assert_eq!(primary.quote_call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_coalesce() {
        let primary = Arc::new(StubProvider::new("av").with_delay(Duration::from_millis(50)));
        let engine = build_engine(engine_config("av", None), &primary, None);

        let (a, b) = tokio::join!(engine.get_quote("AAPL"), engine.get_quote("AAPL"));
        assert!(a.success);
        assert!(b.success);
        assert!((a.data.unwrap().price - b.data.unwrap().price).abs() < 1e-9);
        assert_eq!(primary.quote_call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_symbol_never_reaches_adapter() {
        let primary = Arc::new(StubProvider::new("av"));
        let engine = build_engine(engine_config("av", None), &primary, None);

        let envelope = engine.get_quote("bad symbol!").await;
        assert!(!envelope.success);
        assert_eq!(envelope.source, ENGINE_SOURCE);
        assert_eq!(primary.quote_call_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_tolerates_partial_failure() {
        let primary = Arc::new(StubProvider::new("av").with_failing_symbols(&["FAIL"]));
        let engine = build_engine(engine_config("av", None), &primary, None);

        let result = engine
            .get_multiple_quotes(&symbols(&["AAPL", "FAIL", "bad!", "MSFT"]))
            .await;

        assert_eq!(result.success_count, 2);
        assert_eq!(result.error_count, 2);
        assert!(result.items.contains_key("AAPL"));
        assert!(result.items.contains_key("MSFT"));
        assert!(!result.items.contains_key("FAIL"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_chunking_and_pacing() {
        let primary = Arc::new(StubProvider::new("av"));
        let engine = build_engine(engine_config("av", None), &primary, None);

        let ids: Vec<String> = (0..25).map(|i| format!("S{}", i)).collect();
        let result = engine.get_multiple_quotes(&ids).await;
        assert_eq!(result.success_count, 25);
        assert_eq!(result.error_count, 0);

        // Chunks of 10 resolve concurrently; the paced delay sits only
        // between chunks, so under a paused clock every call in a chunk
        // lands on the same instant.
        let times = primary.quote_call_times.lock().unwrap();
        assert_eq!(times.len(), 25);
        let mut starts = Vec::new();
        for t in times.iter() {
            if starts.last() != Some(t) {
                starts.push(*t);
            }
        }
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[1] - starts[0], Duration::from_millis(100));
        assert_eq!(starts[2] - starts[1], Duration::from_millis(100));

        let counts: Vec<usize> = starts
            .iter()
            .map(|s| times.iter().filter(|t| *t == s).count())
            .collect();
        assert_eq!(counts, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_batch_serves_cache_hits_without_refetch() {
        let primary = Arc::new(StubProvider::new("av"));
        let engine = build_engine(engine_config("av", None), &primary, None);

        engine.get_quote("AAPL").await;
        let result = engine.get_multiple_quotes(&symbols(&["AAPL", "MSFT"])).await;

        assert_eq!(result.success_count, 2);
        assert_eq!(primary.quote_call_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_counters_count_each_lookup_once() {
        let primary = Arc::new(StubProvider::new("av"));
        let engine = build_engine(engine_config("av", None), &primary, None);

        engine.get_quote("AAPL").await; // cold: one miss
        engine.get_quote("AAPL").await; // warm: one hit

        let report = engine.health_check().await;
        assert_eq!(report.cache_misses, 1);
        assert_eq!(report.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_batch_counters_count_each_key_once() {
        let primary = Arc::new(StubProvider::new("av"));
        let engine = build_engine(engine_config("av", None), &primary, None);

        let ids = symbols(&["AAPL", "MSFT"]);
        engine.get_multiple_quotes(&ids).await; // cold: two misses
        engine.get_multiple_quotes(&ids).await; // warm: two hits

        let report = engine.health_check().await;
        assert_eq!(report.cache_misses, 2);
        assert_eq!(report.cache_hits, 2);
    }

    #[tokio::test]
    async fn test_validate_symbol_format_gate() {
        let primary = Arc::new(StubProvider::new("av"));
        let engine = build_engine(engine_config("av", None), &primary, None);

        let envelope = engine.validate_symbol("not a symbol").await;
        assert!(envelope.success);
        let validation = envelope.data.unwrap();
        assert!(!validation.valid);
        assert!(validation.reason.is_some());
    }

    #[tokio::test]
    async fn test_validate_symbol_upstream_match() {
        let primary = Arc::new(StubProvider::new("av"));
        let engine = build_engine(engine_config("av", None), &primary, None);

        let envelope = engine.validate_symbol("AAPL").await;
        assert!(envelope.success);
        assert!(envelope.data.unwrap().valid);
    }

    #[tokio::test]
    async fn test_health_check_reports_per_source() {
        let primary = Arc::new(StubProvider::new("av"));
        let secondary = Arc::new(StubProvider::new("yahoo").failing());
        let engine = build_engine(engine_config("av", Some("yahoo")), &primary, Some(&secondary));

        engine.get_quote("MSFT").await;
        let report = engine.health_check().await;

        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[0].source, "av");
        assert!(report.sources[0].reachable);
        assert_eq!(report.sources[1].source, "yahoo");
        assert!(!report.sources[1].reachable);
        assert!(report.sources[1].error.is_some());
        assert_eq!(report.cache_entries, 1);
    }

    #[tokio::test]
    async fn test_unknown_source_rejected_at_construction() {
        let primary = Arc::new(StubProvider::new("av"));
        let mut providers: HashMap<String, Arc<dyn MarketDataProvider>> = HashMap::new();
        providers.insert("av".to_string(), primary as Arc<dyn MarketDataProvider>);

        let result = MarketDataEngine::new(
            engine_config("missing", None),
            providers,
            Arc::new(CacheStore::new()),
        );
        assert!(matches!(result, Err(MarketError::UnknownSource(s)) if s == "missing"));
    }
}
