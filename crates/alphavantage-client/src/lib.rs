use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use market_core::{
    CompanyOverview, IndicatorKind, Interval, MarketDataProvider, MarketStatus, NewsItem, Quote,
    ResponseEnvelope, SymbolMatch, TechnicalIndicator, TimeSeries,
};
use serde_json::Value;
use std::time::Duration;

pub mod parse;

use parse::*;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const SOURCE_ID: &str = "alpha_vantage";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Alpha Vantage adapter. Translates the query-param function API and its
/// string-typed numeric payloads into canonical records.
#[derive(Clone)]
pub struct AlphaVantageClient {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, BASE_URL.to_string())
    }

    /// Construct against a non-default endpoint (tests, proxies)
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key,
            client,
            base_url,
        }
    }

    /// Issue one GET and surface upstream error payloads as errors
    async fn fetch(&self, params: &[(&str, &str)]) -> Result<Value> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("apikey", self.api_key.as_str()));

        let response = self.client.get(&self.base_url).query(&query).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP {}", response.status()));
        }

        let json: Value = response.json().await?;
        if let Some(e) = error_payload(&json) {
            return Err(e);
        }
        Ok(json)
    }

    fn envelope<T>(&self, result: Result<T>) -> ResponseEnvelope<T> {
        match result {
            Ok(data) => ResponseEnvelope::ok(data, SOURCE_ID),
            Err(e) => {
                tracing::warn!("Alpha Vantage call failed: {}", e);
                ResponseEnvelope::err(e.to_string(), SOURCE_ID)
            }
        }
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageClient {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    async fn get_quote(&self, symbol: &str) -> ResponseEnvelope<Quote> {
        let result = self
            .fetch(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)])
            .await
            .and_then(|json| parse_global_quote(&json, symbol));
        self.envelope(result)
    }

    async fn get_series(&self, symbol: &str, interval: Interval) -> ResponseEnvelope<TimeSeries> {
        let mut params: Vec<(&str, &str)> = vec![("symbol", symbol)];
        let function = series_function(interval);
        params.push(("function", function));
        let tag = interval.tag();
        if interval.is_intraday() {
            params.push(("interval", tag));
        }

        let result = self
            .fetch(&params)
            .await
            .and_then(|json| parse_time_series(&json, symbol, interval));
        self.envelope(result)
    }

    async fn get_overview(&self, symbol: &str) -> ResponseEnvelope<CompanyOverview> {
        let result = self
            .fetch(&[("function", "OVERVIEW"), ("symbol", symbol)])
            .await
            .and_then(|json| parse_overview(&json, symbol));
        self.envelope(result)
    }

    async fn get_news(
        &self,
        tickers: Option<&[String]>,
        topics: Option<&[String]>,
        limit: u32,
    ) -> ResponseEnvelope<Vec<NewsItem>> {
        let limit_str = limit.to_string();
        let tickers_str = tickers.map(|t| t.join(","));
        let topics_str = topics.map(|t| t.join(","));

        let mut params: Vec<(&str, &str)> =
            vec![("function", "NEWS_SENTIMENT"), ("limit", &limit_str)];
        if let Some(ref t) = tickers_str {
            params.push(("tickers", t));
        }
        if let Some(ref t) = topics_str {
            params.push(("topics", t));
        }

        let result = self.fetch(&params).await.and_then(|json| parse_news(&json));
        self.envelope(result)
    }

    async fn get_indicator(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        interval: Interval,
        period: u32,
    ) -> ResponseEnvelope<TechnicalIndicator> {
        let period_str = period.to_string();
        let result = self
            .fetch(&[
                ("function", kind.name()),
                ("symbol", symbol),
                ("interval", interval.tag()),
                ("time_period", &period_str),
                ("series_type", "close"),
            ])
            .await
            .and_then(|json| parse_indicator(&json, symbol, kind, interval, period));
        self.envelope(result)
    }

    async fn search(&self, keywords: &str) -> ResponseEnvelope<Vec<SymbolMatch>> {
        let result = self
            .fetch(&[("function", "SYMBOL_SEARCH"), ("keywords", keywords)])
            .await
            .and_then(|json| parse_search(&json));
        self.envelope(result)
    }

    async fn get_status(&self) -> ResponseEnvelope<MarketStatus> {
        let result = self
            .fetch(&[("function", "MARKET_STATUS")])
            .await
            .and_then(|json| parse_market_status(&json));
        self.envelope(result)
    }
}

/// Alpha Vantage reports failures inside a 200 body: "Error Message" for
/// malformed requests, "Note"/"Information" for quota exhaustion.
fn error_payload(json: &Value) -> Option<anyhow::Error> {
    if let Some(error) = json.get("Error Message") {
        return Some(anyhow!("Alpha Vantage error: {}", error));
    }
    if let Some(note) = json.get("Note").or_else(|| json.get("Information")) {
        return Some(anyhow!("Alpha Vantage rate limit: {}", note));
    }
    None
}

fn series_function(interval: Interval) -> &'static str {
    match interval {
        i if i.is_intraday() => "TIME_SERIES_INTRADAY",
        Interval::Weekly => "TIME_SERIES_WEEKLY",
        Interval::Monthly => "TIME_SERIES_MONTHLY",
        _ => "TIME_SERIES_DAILY",
    }
}

/// Parse a date or datetime string as it appears in series keys
pub(crate) fn parse_av_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&dt));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")?;
    let dt = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date: {}", raw))?;
    Ok(Utc.from_utc_datetime(&dt))
}

/// News feed timestamps use a compact form: 20240102T123000
pub(crate) fn parse_news_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let dt = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")?;
    Ok(Utc.from_utc_datetime(&dt))
}
