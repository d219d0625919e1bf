use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use market_core::{
    CompanyOverview, IndicatorKind, IndicatorParams, IndicatorPoint, Interval, MarketDataProvider,
    MarketStatus, NewsItem, Quote, ResponseEnvelope, SymbolMatch, TechnicalIndicator, TimeSeries,
};
use serde_json::Value;

pub mod indicators;
pub mod parse;

const QUOTE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/quote";
const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const SOURCE_ID: &str = "yahoo";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const STATUS_PROBE_SYMBOL: &str = "^GSPC";

/// Yahoo Finance adapter. Secondary source: no API key, no sentiment
/// scoring, and no indicator endpoint; indicators are computed locally
/// from chart closes.
#[derive(Clone)]
pub struct YahooFinanceClient {
    client: reqwest::Client,
    quote_url: String,
    chart_url: String,
    search_url: String,
}

impl YahooFinanceClient {
    pub fn new() -> Self {
        Self::with_base_urls(
            QUOTE_URL.to_string(),
            CHART_URL.to_string(),
            SEARCH_URL.to_string(),
        )
    }

    /// Construct against non-default endpoints (tests, proxies)
    pub fn with_base_urls(quote_url: String, chart_url: String, search_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            quote_url,
            chart_url,
            search_url,
        }
    }

    async fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Result<Value> {
        let response = self.client.get(url).query(params).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP {}", response.status()));
        }
        Ok(response.json().await?)
    }

    async fn fetch_quote_row(&self, symbol: &str) -> Result<Value> {
        self.fetch(&self.quote_url, &[("symbols", symbol)]).await
    }

    async fn fetch_chart(&self, symbol: &str, interval: Interval) -> Result<TimeSeries> {
        let now = Utc::now();
        let start = now - chart_lookback(interval);
        let url = format!("{}/{}", self.chart_url, symbol);
        let period1 = start.timestamp().to_string();
        let period2 = now.timestamp().to_string();

        let json = self
            .fetch(
                &url,
                &[
                    ("period1", period1.as_str()),
                    ("period2", period2.as_str()),
                    ("interval", yahoo_interval(interval)),
                ],
            )
            .await?;

        parse::parse_chart(&json, symbol, interval)
    }

    fn envelope<T>(&self, result: Result<T>) -> ResponseEnvelope<T> {
        match result {
            Ok(data) => ResponseEnvelope::ok(data, SOURCE_ID),
            Err(e) => {
                tracing::warn!("Yahoo call failed: {}", e);
                ResponseEnvelope::err(e.to_string(), SOURCE_ID)
            }
        }
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceClient {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    async fn get_quote(&self, symbol: &str) -> ResponseEnvelope<Quote> {
        let result = self
            .fetch_quote_row(symbol)
            .await
            .and_then(|json| parse::parse_quote(&json, symbol));
        self.envelope(result)
    }

    async fn get_series(&self, symbol: &str, interval: Interval) -> ResponseEnvelope<TimeSeries> {
        let result = self.fetch_chart(symbol, interval).await;
        self.envelope(result)
    }

    async fn get_overview(&self, symbol: &str) -> ResponseEnvelope<CompanyOverview> {
        let result = self
            .fetch_quote_row(symbol)
            .await
            .and_then(|json| parse::parse_overview(&json, symbol));
        self.envelope(result)
    }

    async fn get_news(
        &self,
        tickers: Option<&[String]>,
        _topics: Option<&[String]>,
        limit: u32,
    ) -> ResponseEnvelope<Vec<NewsItem>> {
        // The search endpoint carries a news feed per query; probe with the
        // first ticker or a broad market query.
        let query = tickers
            .and_then(|t| t.first().cloned())
            .unwrap_or_else(|| "stock market".to_string());
        let count = limit.to_string();

        let result = self
            .fetch(
                &self.search_url,
                &[("q", query.as_str()), ("newsCount", count.as_str())],
            )
            .await
            .and_then(|json| parse::parse_news(&json))
            .map(|mut items| {
                items.truncate(limit as usize);
                items
            });
        self.envelope(result)
    }

    async fn get_indicator(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        interval: Interval,
        period: u32,
    ) -> ResponseEnvelope<TechnicalIndicator> {
        let result = self
            .fetch_chart(symbol, interval)
            .await
            .and_then(|series| compute_indicator(&series, kind, interval, period));
        self.envelope(result)
    }

    async fn search(&self, keywords: &str) -> ResponseEnvelope<Vec<SymbolMatch>> {
        let result = self
            .fetch(&self.search_url, &[("q", keywords)])
            .await
            .and_then(|json| parse::parse_search(&json));
        self.envelope(result)
    }

    async fn get_status(&self) -> ResponseEnvelope<MarketStatus> {
        let result = self
            .fetch_quote_row(STATUS_PROBE_SYMBOL)
            .await
            .and_then(|json| parse::parse_market_status(&json));
        self.envelope(result)
    }
}

fn yahoo_interval(interval: Interval) -> &'static str {
    match interval {
        Interval::Min1 => "1m",
        Interval::Min5 => "5m",
        Interval::Min15 => "15m",
        Interval::Min30 => "30m",
        Interval::Min60 => "60m",
        Interval::Daily => "1d",
        Interval::Weekly => "1wk",
        Interval::Monthly => "1mo",
    }
}

/// How far back to request chart data; generous enough for indicator
/// warm-up windows at each granularity.
fn chart_lookback(interval: Interval) -> Duration {
    match interval {
        i if i.is_intraday() => Duration::days(7),
        Interval::Daily => Duration::days(365),
        Interval::Weekly => Duration::days(5 * 365),
        _ => Duration::days(10 * 365),
    }
}

/// Compute an indicator series from chart bars, aligning each output
/// value with the bar that completes its window.
fn compute_indicator(
    series: &TimeSeries,
    kind: IndicatorKind,
    interval: Interval,
    period: u32,
) -> Result<TechnicalIndicator> {
    let closes: Vec<f64> = series.bars.iter().map(|b| b.close).collect();
    let values = match kind {
        IndicatorKind::Sma => indicators::sma(&closes, period as usize),
        IndicatorKind::Ema => indicators::ema(&closes, period as usize),
        IndicatorKind::Rsi => indicators::rsi(&closes, period as usize),
        IndicatorKind::Macd => indicators::macd(&closes),
    };

    if values.is_empty() {
        return Err(anyhow!(
            "not enough bars for {}({}) on {}: have {}",
            kind.name(),
            period,
            series.symbol,
            closes.len()
        ));
    }

    let offset = series.bars.len() - values.len();
    let points = series.bars[offset..]
        .iter()
        .zip(values)
        .map(|(bar, value)| IndicatorPoint {
            date: bar.timestamp,
            value,
        })
        .collect();

    Ok(TechnicalIndicator {
        symbol: series.symbol.clone(),
        kind,
        points,
        params: IndicatorParams {
            period,
            series_type: "close".to_string(),
            interval,
        },
        source: SOURCE_ID.to_string(),
    })
}
