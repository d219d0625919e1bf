use async_trait::async_trait;

use crate::{
    CompanyOverview, IndicatorKind, Interval, MarketStatus, NewsItem, Quote, ResponseEnvelope,
    SymbolMatch, TechnicalIndicator, TimeSeries,
};

/// Source-agnostic contract every upstream adapter implements.
///
/// Adapters are stateless translators: they normalize the upstream wire
/// format into canonical records and report every outcome as a
/// `ResponseEnvelope`. They never panic and never retry internally; retry
/// and fallback policy belong to the engine.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Stable identifier used for source annotation and provider lookup
    fn source_id(&self) -> &str;

    async fn get_quote(&self, symbol: &str) -> ResponseEnvelope<Quote>;

    async fn get_series(&self, symbol: &str, interval: Interval) -> ResponseEnvelope<TimeSeries>;

    async fn get_overview(&self, symbol: &str) -> ResponseEnvelope<CompanyOverview>;

    async fn get_news(
        &self,
        tickers: Option<&[String]>,
        topics: Option<&[String]>,
        limit: u32,
    ) -> ResponseEnvelope<Vec<NewsItem>>;

    async fn get_indicator(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        interval: Interval,
        period: u32,
    ) -> ResponseEnvelope<TechnicalIndicator>;

    async fn search(&self, keywords: &str) -> ResponseEnvelope<Vec<SymbolMatch>>;

    async fn get_status(&self) -> ResponseEnvelope<MarketStatus>;
}
