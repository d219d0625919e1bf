//! Normalization of Yahoo Finance JSON payloads into canonical records.
//!
//! Yahoo nests everything under response-shaped wrappers
//! (`quoteResponse.result[0]`, `chart.result[0]`) and punches nulls into
//! its parallel OHLCV arrays; rows with any missing component are dropped.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use market_core::{
    Bar, CompanyOverview, Interval, MarketStatus, MarketStatusEntry, NewsItem, Quote,
    SentimentLabel, SymbolMatch, TimeSeries,
};
use serde_json::Value;

use crate::SOURCE_ID;

fn f64_field(obj: &Value, key: &str) -> f64 {
    obj.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn str_field(obj: &Value, key: &str) -> String {
    obj.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// First row of `quoteResponse.result`
fn quote_result(json: &Value) -> Result<&Value> {
    json.get("quoteResponse")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| anyhow!("no quote data in response"))
}

pub fn parse_quote(json: &Value, symbol: &str) -> Result<Quote> {
    let q = quote_result(json)?;

    let price = f64_field(q, "regularMarketPrice");
    if price <= 0.0 {
        return Err(anyhow!("no tradable price for {}", symbol));
    }

    let change = f64_field(q, "regularMarketChange");
    let previous_close = f64_field(q, "regularMarketPreviousClose");
    let change_percent = if previous_close > 0.0 {
        Quote::derive_change_percent(change, previous_close)
    } else {
        f64_field(q, "regularMarketChangePercent")
    };

    let timestamp = q
        .get("regularMarketTime")
        .and_then(|v| v.as_i64())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    Ok(Quote {
        symbol: symbol.to_string(),
        price,
        change,
        change_percent,
        volume: q
            .get("regularMarketVolume")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        open: f64_field(q, "regularMarketOpen"),
        high: f64_field(q, "regularMarketDayHigh"),
        low: f64_field(q, "regularMarketDayLow"),
        previous_close,
        timestamp,
        source: SOURCE_ID.to_string(),
    })
}

pub fn parse_chart(json: &Value, symbol: &str, interval: Interval) -> Result<TimeSeries> {
    let chart = json
        .get("chart")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| anyhow!("no chart data for {}", symbol))?;

    let timestamps = chart
        .get("timestamp")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("no timestamps in chart for {}", symbol))?;

    let quote = chart
        .get("indicators")
        .and_then(|v| v.get("quote"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| anyhow!("no OHLCV arrays in chart for {}", symbol))?;

    let series = |key: &str| quote.get(key).and_then(|v| v.as_array());
    let (opens, highs, lows, closes, volumes) = match (
        series("open"),
        series("high"),
        series("low"),
        series("close"),
        series("volume"),
    ) {
        (Some(o), Some(h), Some(l), Some(c), Some(v)) => (o, h, l, c, v),
        _ => return Err(anyhow!("incomplete OHLCV arrays for {}", symbol)),
    };

    let mut bars = Vec::with_capacity(timestamps.len());
    for i in 0..timestamps.len() {
        if let (Some(ts), Some(o), Some(h), Some(l), Some(c), Some(v)) = (
            timestamps.get(i).and_then(|v| v.as_i64()),
            opens.get(i).and_then(|v| v.as_f64()),
            highs.get(i).and_then(|v| v.as_f64()),
            lows.get(i).and_then(|v| v.as_f64()),
            closes.get(i).and_then(|v| v.as_f64()),
            volumes.get(i).and_then(|v| v.as_u64()),
        ) {
            let timestamp =
                DateTime::from_timestamp(ts, 0).ok_or_else(|| anyhow!("invalid timestamp {}", ts))?;
            bars.push(Bar {
                timestamp,
                open: o,
                high: h,
                low: l,
                close: c,
                volume: v,
            });
        }
    }

    Ok(TimeSeries {
        symbol: symbol.to_string(),
        interval,
        bars,
        last_refreshed: Utc::now(),
        source: SOURCE_ID.to_string(),
    }
    .normalize())
}

/// Yahoo folds fundamentals into the quote row; absent fields become 0.0
pub fn parse_overview(json: &Value, symbol: &str) -> Result<CompanyOverview> {
    let q = quote_result(json)?;

    Ok(CompanyOverview {
        symbol: symbol.to_string(),
        name: str_field(q, "longName"),
        description: String::new(),
        sector: str_field(q, "sector"),
        industry: str_field(q, "industry"),
        market_cap: f64_field(q, "marketCap"),
        pe_ratio: f64_field(q, "trailingPE"),
        peg_ratio: f64_field(q, "pegRatio"),
        eps: f64_field(q, "epsTrailingTwelveMonths"),
        book_value: f64_field(q, "bookValue"),
        dividend_yield: f64_field(q, "dividendYield"),
        profit_margin: f64_field(q, "profitMargins"),
        operating_margin: f64_field(q, "operatingMargins"),
        return_on_equity: f64_field(q, "returnOnEquity"),
        revenue: f64_field(q, "totalRevenue"),
        beta: f64_field(q, "beta"),
        fifty_two_week_high: f64_field(q, "fiftyTwoWeekHigh"),
        fifty_two_week_low: f64_field(q, "fiftyTwoWeekLow"),
        shares_outstanding: f64_field(q, "sharesOutstanding"),
        source: SOURCE_ID.to_string(),
    })
}

pub fn parse_search(json: &Value) -> Result<Vec<SymbolMatch>> {
    let quotes = json
        .get("quotes")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("no search results in response"))?;

    Ok(quotes
        .iter()
        .enumerate()
        .filter_map(|(rank, q)| {
            let symbol = q.get("symbol").and_then(|v| v.as_str())?;
            let name = q
                .get("longname")
                .or_else(|| q.get("shortname"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Some(SymbolMatch {
                symbol: symbol.to_string(),
                name: name.to_string(),
                region: str_field(q, "exchDisp"),
                currency: String::new(),
                // Yahoo returns rank order, not scores
                match_score: 1.0 / (rank as f64 + 1.0),
            })
        })
        .collect())
}

/// Yahoo carries no sentiment scoring; articles normalize to a neutral
/// score so downstream arithmetic stays total.
pub fn parse_news(json: &Value) -> Result<Vec<NewsItem>> {
    let news = json
        .get("news")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("no news in response"))?;

    Ok(news
        .iter()
        .filter_map(|article| {
            let published = article
                .get("providerPublishTime")
                .and_then(|v| v.as_i64())
                .and_then(|secs| DateTime::from_timestamp(secs, 0))?;
            Some(NewsItem {
                title: str_field(article, "title"),
                url: str_field(article, "link"),
                published,
                source: str_field(article, "publisher"),
                summary: String::new(),
                sentiment_score: 0.0,
                sentiment_label: SentimentLabel::Neutral,
                ticker_sentiment: Vec::new(),
            })
        })
        .collect())
}

/// Market state derived from an index quote's `marketState` field
pub fn parse_market_status(json: &Value) -> Result<MarketStatus> {
    let q = quote_result(json)?;
    let state = str_field(q, "marketState");

    Ok(MarketStatus {
        markets: vec![MarketStatusEntry {
            market_type: "Equity".to_string(),
            region: "United States".to_string(),
            primary_exchanges: str_field(q, "fullExchangeName"),
            is_open: state.eq_ignore_ascii_case("REGULAR"),
            notes: format!("market state: {}", state),
        }],
        timestamp: Utc::now(),
        source: SOURCE_ID.to_string(),
    })
}
