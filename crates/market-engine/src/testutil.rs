//! Scripted provider double used by the engine tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use market_core::{
    Bar, CompanyOverview, IndicatorKind, IndicatorParams, IndicatorPoint, Interval,
    MarketDataProvider, MarketStatus, MarketStatusEntry, NewsItem, Quote, ResponseEnvelope,
    SentimentLabel, SymbolMatch, TechnicalIndicator, TimeSeries,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::engine::MarketDataEngine;

pub fn engine_config(primary: &str, fallback: Option<&str>) -> EngineConfig {
    EngineConfig {
        primary_source: primary.to_string(),
        fallback_source: fallback.map(|s| s.to_string()),
        ..EngineConfig::default()
    }
}

pub fn build_engine(
    config: EngineConfig,
    primary: &Arc<StubProvider>,
    fallback: Option<&Arc<StubProvider>>,
) -> MarketDataEngine {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut providers: HashMap<String, Arc<dyn MarketDataProvider>> = HashMap::new();
    providers.insert(
        primary.source_id().to_string(),
        Arc::clone(primary) as Arc<dyn MarketDataProvider>,
    );
    if let Some(f) = fallback {
        providers.insert(
            f.source_id().to_string(),
            Arc::clone(f) as Arc<dyn MarketDataProvider>,
        );
    }
    MarketDataEngine::new(config, providers, Arc::new(CacheStore::new()))
        .expect("engine construction")
}

pub struct StubProvider {
    id: String,
    price: f64,
    fail_all: bool,
    fail_news: bool,
    empty_news: bool,
    failing_symbols: HashSet<String>,
    fail_next_quotes: AtomicUsize,
    delay: Option<Duration>,
    pub quote_calls: AtomicUsize,
    pub news_calls: AtomicUsize,
    pub quote_call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl StubProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            price: 150.25,
            fail_all: false,
            fail_news: false,
            empty_news: false,
            failing_symbols: HashSet::new(),
            fail_next_quotes: AtomicUsize::new(0),
            delay: None,
            quote_calls: AtomicUsize::new(0),
            news_calls: AtomicUsize::new(0),
            quote_call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_fail_news(mut self) -> Self {
        self.fail_news = true;
        self
    }

    pub fn with_empty_news(mut self) -> Self {
        self.empty_news = true;
        self
    }

    pub fn with_failing_symbols(mut self, symbols: &[&str]) -> Self {
        self.failing_symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// The next `n` quote calls fail, then calls succeed
    pub fn with_fail_next_quotes(mut self, n: usize) -> Self {
        self.fail_next_quotes = AtomicUsize::new(n);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn quote_call_count(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    fn make_quote(&self, symbol: &str) -> Quote {
        let change = 2.50;
        let previous_close = self.price - change;
        Quote {
            symbol: symbol.to_string(),
            price: self.price,
            change,
            change_percent: Quote::derive_change_percent(change, previous_close),
            volume: 58_234_120,
            open: previous_close + 0.25,
            high: self.price + 0.75,
            low: previous_close - 0.25,
            previous_close,
            timestamp: Utc::now(),
            source: self.id.clone(),
        }
    }

    async fn maybe_delay(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MarketDataProvider for StubProvider {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn get_quote(&self, symbol: &str) -> ResponseEnvelope<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.quote_call_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        self.maybe_delay().await;

        if self
            .fail_next_quotes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return ResponseEnvelope::err(format!("{}: transient failure", self.id), &self.id);
        }
        if self.fail_all || self.failing_symbols.contains(symbol) {
            return ResponseEnvelope::err(format!("{}: quote unavailable", self.id), &self.id);
        }
        ResponseEnvelope::ok(self.make_quote(symbol), &self.id)
    }

    async fn get_series(&self, symbol: &str, interval: Interval) -> ResponseEnvelope<TimeSeries> {
        if self.fail_all {
            return ResponseEnvelope::err(format!("{}: series unavailable", self.id), &self.id);
        }
        let bars = (0..30i64)
            .map(|i| {
                let close = 100.0 + i as f64;
                Bar {
                    timestamp: Utc::now() - ChronoDuration::days(30 - i),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000,
                }
            })
            .collect();
        ResponseEnvelope::ok(
            TimeSeries {
                symbol: symbol.to_string(),
                interval,
                bars,
                last_refreshed: Utc::now(),
                source: self.id.clone(),
            },
            &self.id,
        )
    }

    async fn get_overview(&self, symbol: &str) -> ResponseEnvelope<CompanyOverview> {
        if self.fail_all {
            return ResponseEnvelope::err(format!("{}: overview unavailable", self.id), &self.id);
        }
        ResponseEnvelope::ok(
            CompanyOverview {
                symbol: symbol.to_string(),
                name: "Stub Corp".to_string(),
                market_cap: 1.0e12,
                pe_ratio: 25.0,
                eps: 6.0,
                source: self.id.clone(),
                ..Default::default()
            },
            &self.id,
        )
    }

    async fn get_news(
        &self,
        _tickers: Option<&[String]>,
        _topics: Option<&[String]>,
        limit: u32,
    ) -> ResponseEnvelope<Vec<NewsItem>> {
        self.news_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || self.fail_news {
            return ResponseEnvelope::err(format!("{}: news unavailable", self.id), &self.id);
        }
        if self.empty_news {
            return ResponseEnvelope::ok(Vec::new(), &self.id);
        }
        let items = (0..limit.min(2))
            .map(|i| NewsItem {
                title: format!("Headline {}", i),
                url: format!("https://example.com/{}", i),
                published: Utc::now(),
                source: self.id.clone(),
                summary: String::new(),
                sentiment_score: 0.4,
                sentiment_label: SentimentLabel::Bullish,
                ticker_sentiment: Vec::new(),
            })
            .collect();
        ResponseEnvelope::ok(items, &self.id)
    }

    async fn get_indicator(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        interval: Interval,
        period: u32,
    ) -> ResponseEnvelope<TechnicalIndicator> {
        if self.fail_all {
            return ResponseEnvelope::err(format!("{}: indicator unavailable", self.id), &self.id);
        }
        let points = (0..5i64)
            .map(|i| IndicatorPoint {
                date: Utc::now() - ChronoDuration::days(5 - i),
                value: 50.0 + i as f64,
            })
            .collect();
        ResponseEnvelope::ok(
            TechnicalIndicator {
                symbol: symbol.to_string(),
                kind,
                points,
                params: IndicatorParams {
                    period,
                    series_type: "close".to_string(),
                    interval,
                },
                source: self.id.clone(),
            },
            &self.id,
        )
    }

    async fn search(&self, keywords: &str) -> ResponseEnvelope<Vec<SymbolMatch>> {
        if self.fail_all {
            return ResponseEnvelope::err(format!("{}: search unavailable", self.id), &self.id);
        }
        ResponseEnvelope::ok(
            vec![SymbolMatch {
                symbol: keywords.to_string(),
                name: "Stub Corp".to_string(),
                region: "United States".to_string(),
                currency: "USD".to_string(),
                match_score: 1.0,
            }],
            &self.id,
        )
    }

    async fn get_status(&self) -> ResponseEnvelope<MarketStatus> {
        if self.fail_all {
            return ResponseEnvelope::err(format!("{}: status unavailable", self.id), &self.id);
        }
        ResponseEnvelope::ok(
            MarketStatus {
                markets: vec![MarketStatusEntry {
                    market_type: "Equity".to_string(),
                    region: "United States".to_string(),
                    primary_exchanges: "NASDAQ, NYSE".to_string(),
                    is_open: true,
                    notes: String::new(),
                }],
                timestamp: Utc::now(),
                source: self.id.clone(),
            },
            &self.id,
        )
    }
}
