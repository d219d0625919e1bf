use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Real-time quote for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub previous_close: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl Quote {
    /// Derive change percent from change and previous close.
    /// Keeps the three fields internally consistent when upstream
    /// reports only two of them.
    pub fn derive_change_percent(change: f64, previous_close: f64) -> f64 {
        if previous_close == 0.0 {
            0.0
        } else {
            change / previous_close * 100.0
        }
    }
}

/// OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Bar granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min5,
    Min15,
    Min30,
    Min60,
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    pub fn as_minutes(&self) -> i64 {
        match self {
            Interval::Min1 => 1,
            Interval::Min5 => 5,
            Interval::Min15 => 15,
            Interval::Min30 => 30,
            Interval::Min60 => 60,
            Interval::Daily => 1440,
            Interval::Weekly => 10080,
            Interval::Monthly => 43200,
        }
    }

    /// Stable tag used in cache keys and logs
    pub fn tag(&self) -> &'static str {
        match self {
            Interval::Min1 => "1min",
            Interval::Min5 => "5min",
            Interval::Min15 => "15min",
            Interval::Min30 => "30min",
            Interval::Min60 => "60min",
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
        }
    }

    pub fn is_intraday(&self) -> bool {
        self.as_minutes() < 1440
    }
}

/// Ordered bar series for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    pub symbol: String,
    pub interval: Interval,
    /// Bars in ascending timestamp order, no duplicates
    pub bars: Vec<Bar>,
    pub last_refreshed: DateTime<Utc>,
    pub source: String,
}

impl TimeSeries {
    /// Sort bars ascending and drop duplicate timestamps (keeps first)
    pub fn normalize(mut self) -> Self {
        self.bars.sort_by_key(|b| b.timestamp);
        self.bars.dedup_by_key(|b| b.timestamp);
        self
    }
}

/// Company fundamentals. Numeric fields default to 0.0 when the upstream
/// omits them so downstream arithmetic stays total.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyOverview {
    pub symbol: String,
    pub name: String,
    pub description: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: f64,
    pub pe_ratio: f64,
    pub peg_ratio: f64,
    pub eps: f64,
    pub book_value: f64,
    pub dividend_yield: f64,
    pub profit_margin: f64,
    pub operating_margin: f64,
    pub return_on_equity: f64,
    pub revenue: f64,
    pub beta: f64,
    pub fifty_two_week_high: f64,
    pub fifty_two_week_low: f64,
    pub shares_outstanding: f64,
    pub source: String,
}

/// Categorical sentiment bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Bearish,
    SomewhatBearish,
    Neutral,
    SomewhatBullish,
    Bullish,
}

impl SentimentLabel {
    /// Bucket a score in [-1, 1]
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s <= -0.35 => SentimentLabel::Bearish,
            s if s <= -0.15 => SentimentLabel::SomewhatBearish,
            s if s < 0.15 => SentimentLabel::Neutral,
            s if s < 0.35 => SentimentLabel::SomewhatBullish,
            _ => SentimentLabel::Bullish,
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            SentimentLabel::Bearish => "Bearish",
            SentimentLabel::SomewhatBearish => "Somewhat-Bearish",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::SomewhatBullish => "Somewhat-Bullish",
            SentimentLabel::Bullish => "Bullish",
        }
    }
}

/// Per-ticker sentiment attribution inside one article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSentiment {
    pub ticker: String,
    pub relevance_score: f64,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
}

/// News article with sentiment scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub published: DateTime<Utc>,
    pub source: String,
    pub summary: String,
    /// Overall article sentiment in [-1, 1]
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub ticker_sentiment: Vec<TickerSentiment>,
}

/// Supported technical indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Macd,
}

impl IndicatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "SMA",
            IndicatorKind::Ema => "EMA",
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::Macd => "MACD",
        }
    }
}

/// One dated indicator value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
}

/// Parameters the indicator was computed with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub period: u32,
    pub series_type: String,
    pub interval: Interval,
}

/// Computed indicator series for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalIndicator {
    pub symbol: String,
    pub kind: IndicatorKind,
    /// Points in ascending date order
    pub points: Vec<IndicatorPoint>,
    pub params: IndicatorParams,
    pub source: String,
}

/// Open/closed state of one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStatusEntry {
    pub market_type: String,
    pub region: String,
    pub primary_exchanges: String,
    pub is_open: bool,
    pub notes: String,
}

/// Global market status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStatus {
    pub markets: Vec<MarketStatusEntry>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// Symbol search result row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: String,
    pub region: String,
    pub currency: String,
    /// Upstream relevance score in [0, 1]
    pub match_score: f64,
}

/// Outcome of a symbol validation probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolValidation {
    pub symbol: String,
    pub valid: bool,
    pub reason: Option<String>,
}

/// Indicator pair fetched by composite analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeIndicators {
    pub sma: Option<TechnicalIndicator>,
    pub rsi: Option<TechnicalIndicator>,
}

/// Best-effort composite analysis for one symbol. Each field is None
/// when its constituent lookup failed; the analysis itself only fails
/// when every constituent does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeAnalysis {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub quote: Option<Quote>,
    pub overview: Option<CompanyOverview>,
    pub news: Option<Vec<NewsItem>>,
    pub indicators: CompositeIndicators,
}

impl CompositeAnalysis {
    /// Count of constituent lookups that resolved
    pub fn resolved_fields(&self) -> usize {
        self.quote.is_some() as usize
            + self.overview.is_some() as usize
            + self.news.is_some() as usize
            + self.indicators.sma.is_some() as usize
            + self.indicators.rsi.is_some() as usize
    }
}

/// Cross-sectional summary derived from a quote set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSummary {
    pub average_change_percent: f64,
    pub advancing: usize,
    pub declining: usize,
    pub unchanged: usize,
    pub best_performer: Option<String>,
    pub worst_performer: Option<String>,
}

/// Result of comparing several symbols
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub quotes: std::collections::HashMap<String, Quote>,
    pub summary: MarketSummary,
    pub requested: usize,
    pub resolved: usize,
    pub timestamp: DateTime<Utc>,
}

/// Reachability of one configured source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub reachable: bool,
    pub error: Option<String>,
}

/// Engine health report: per-source reachability plus cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub sources: Vec<SourceHealth>,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub timestamp: DateTime<Utc>,
}
