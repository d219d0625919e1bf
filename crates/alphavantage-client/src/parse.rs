//! Pure wire-format normalization for Alpha Vantage payloads.
//!
//! Everything numeric arrives as a string ("150.2500"), percentages carry a
//! trailing '%' ("1.6921%"), and absent fundamentals are the literal string
//! "None". These helpers turn that into typed records and are unit-tested
//! without any HTTP involved.

use anyhow::{anyhow, Result};
use chrono::Utc;
use market_core::{
    CompanyOverview, IndicatorKind, IndicatorParams, IndicatorPoint, Interval, MarketStatus,
    MarketStatusEntry, NewsItem, Quote, SentimentLabel, SymbolMatch, TechnicalIndicator,
    TickerSentiment, TimeSeries,
};
use serde_json::Value;

use crate::{parse_av_timestamp, parse_news_timestamp, SOURCE_ID};

/// Parse a numeric field that may be a string, a number, or the "None" /
/// "-" sentinel. Sentinels and absent fields normalize to the default.
fn num(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() || s == "None" || s == "-" {
                0.0
            } else {
                s.parse().unwrap_or(0.0)
            }
        }
        _ => 0.0,
    }
}

/// Parse a percentage string like "1.6921%" into its numeric value
fn pct(value: Option<&Value>) -> f64 {
    match value.and_then(|v| v.as_str()) {
        Some(s) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        None => num(value),
    }
}

fn str_field(obj: &Value, key: &str) -> String {
    obj.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

pub fn parse_global_quote(json: &Value, symbol: &str) -> Result<Quote> {
    let q = json
        .get("Global Quote")
        .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
        .ok_or_else(|| anyhow!("no quote data for {}", symbol))?;

    let price = num(q.get("05. price"));
    if price <= 0.0 {
        return Err(anyhow!("no tradable price for {}", symbol));
    }

    let change = num(q.get("09. change"));
    let previous_close = num(q.get("08. previous close"));
    // Derive the percentage when previous close is known so the three
    // fields stay internally consistent; fall back to the reported string.
    let change_percent = if previous_close > 0.0 {
        Quote::derive_change_percent(change, previous_close)
    } else {
        pct(q.get("10. change percent"))
    };

    Ok(Quote {
        symbol: symbol.to_string(),
        price,
        change,
        change_percent,
        volume: num(q.get("06. volume")) as u64,
        open: num(q.get("02. open")),
        high: num(q.get("03. high")),
        low: num(q.get("04. low")),
        previous_close,
        timestamp: Utc::now(),
        source: SOURCE_ID.to_string(),
    })
}

/// The series payload lives under a key that names the granularity,
/// e.g. "Time Series (5min)" or "Weekly Time Series".
fn series_key(interval: Interval) -> String {
    match interval {
        Interval::Daily => "Time Series (Daily)".to_string(),
        Interval::Weekly => "Weekly Time Series".to_string(),
        Interval::Monthly => "Monthly Time Series".to_string(),
        intraday => format!("Time Series ({})", intraday.tag()),
    }
}

pub fn parse_time_series(json: &Value, symbol: &str, interval: Interval) -> Result<TimeSeries> {
    let key = series_key(interval);
    let series = json
        .get(&key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow!("no time series data for {}", symbol))?;

    let mut bars = Vec::with_capacity(series.len());
    for (raw_ts, fields) in series {
        let timestamp = parse_av_timestamp(raw_ts)?;
        bars.push(market_core::Bar {
            timestamp,
            open: num(fields.get("1. open")),
            high: num(fields.get("2. high")),
            low: num(fields.get("3. low")),
            close: num(fields.get("4. close")),
            volume: num(fields.get("5. volume")) as u64,
        });
    }

    let last_refreshed = json
        .get("Meta Data")
        .and_then(|m| m.get("3. Last Refreshed"))
        .and_then(|v| v.as_str())
        .and_then(|s| parse_av_timestamp(s).ok())
        .unwrap_or_else(Utc::now);

    Ok(TimeSeries {
        symbol: symbol.to_string(),
        interval,
        bars,
        last_refreshed,
        source: SOURCE_ID.to_string(),
    }
    .normalize())
}

pub fn parse_overview(json: &Value, symbol: &str) -> Result<CompanyOverview> {
    // An unknown symbol yields an empty object with HTTP 200
    let obj = json
        .as_object()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| anyhow!("no overview data for {}", symbol))?;

    if !obj.contains_key("Symbol") {
        return Err(anyhow!("no overview data for {}", symbol));
    }

    Ok(CompanyOverview {
        symbol: symbol.to_string(),
        name: str_field(json, "Name"),
        description: str_field(json, "Description"),
        sector: str_field(json, "Sector"),
        industry: str_field(json, "Industry"),
        market_cap: num(json.get("MarketCapitalization")),
        pe_ratio: num(json.get("PERatio")),
        peg_ratio: num(json.get("PEGRatio")),
        eps: num(json.get("EPS")),
        book_value: num(json.get("BookValue")),
        dividend_yield: num(json.get("DividendYield")),
        profit_margin: num(json.get("ProfitMargin")),
        operating_margin: num(json.get("OperatingMarginTTM")),
        return_on_equity: num(json.get("ReturnOnEquityTTM")),
        revenue: num(json.get("RevenueTTM")),
        beta: num(json.get("Beta")),
        fifty_two_week_high: num(json.get("52WeekHigh")),
        fifty_two_week_low: num(json.get("52WeekLow")),
        shares_outstanding: num(json.get("SharesOutstanding")),
        source: SOURCE_ID.to_string(),
    })
}

pub fn parse_news(json: &Value) -> Result<Vec<NewsItem>> {
    let feed = json
        .get("feed")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("no news feed in response"))?;

    let items = feed
        .iter()
        .filter_map(|article| {
            let published = article
                .get("time_published")
                .and_then(|v| v.as_str())
                .and_then(|s| parse_news_timestamp(s).ok())?;

            let sentiment_score = num(article.get("overall_sentiment_score")).clamp(-1.0, 1.0);

            let ticker_sentiment = article
                .get("ticker_sentiment")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .map(|t| {
                            let score = num(t.get("ticker_sentiment_score")).clamp(-1.0, 1.0);
                            TickerSentiment {
                                ticker: str_field(t, "ticker"),
                                relevance_score: num(t.get("relevance_score")),
                                sentiment_score: score,
                                sentiment_label: SentimentLabel::from_score(score),
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();

            Some(NewsItem {
                title: str_field(article, "title"),
                url: str_field(article, "url"),
                published,
                source: str_field(article, "source"),
                summary: str_field(article, "summary"),
                sentiment_score,
                sentiment_label: SentimentLabel::from_score(sentiment_score),
                ticker_sentiment,
            })
        })
        .collect();

    Ok(items)
}

pub fn parse_indicator(
    json: &Value,
    symbol: &str,
    kind: IndicatorKind,
    interval: Interval,
    period: u32,
) -> Result<TechnicalIndicator> {
    let key = format!("Technical Analysis: {}", kind.name());
    let analysis = json
        .get(&key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow!("no {} data for {}", kind.name(), symbol))?;

    let mut points = Vec::with_capacity(analysis.len());
    for (raw_ts, fields) in analysis {
        let date = parse_av_timestamp(raw_ts)?;
        // MACD payloads carry three series; the headline value is "MACD"
        let value = num(fields.get(kind.name()));
        points.push(IndicatorPoint { date, value });
    }
    points.sort_by_key(|p| p.date);

    Ok(TechnicalIndicator {
        symbol: symbol.to_string(),
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

pub fn parse_search(json: &Value) -> Result<Vec<SymbolMatch>> {
    let matches = json
        .get("bestMatches")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("no search matches in response"))?;

    Ok(matches
        .iter()
        .map(|m| SymbolMatch {
            symbol: str_field(m, "1. symbol"),
            name: str_field(m, "2. name"),
            region: str_field(m, "4. region"),
            currency: str_field(m, "8. currency"),
            match_score: num(m.get("9. matchScore")),
        })
        .collect())
}

pub fn parse_market_status(json: &Value) -> Result<MarketStatus> {
    let markets = json
        .get("markets")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("no market status in response"))?;

    let entries = markets
        .iter()
        .map(|m| MarketStatusEntry {
            market_type: str_field(m, "market_type"),
            region: str_field(m, "region"),
            primary_exchanges: str_field(m, "primary_exchanges"),
            is_open: m
                .get("current_status")
                .and_then(|v| v.as_str())
                .is_some_and(|s| s.eq_ignore_ascii_case("open")),
            notes: str_field(m, "notes"),
        })
        .collect();

    Ok(MarketStatus {
        markets: entries,
        timestamp: Utc::now(),
        source: SOURCE_ID.to_string(),
    })
}
