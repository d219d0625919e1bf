//! Composite analysis: several independent lookups fanned out for one
//! subject, tolerating individual failures.
//!
//! The orchestrator performs no caching of its own; every constituent
//! lookup carries its own cache key, so repeated composite calls reuse
//! per-field cache state even when requested in different combinations.

use chrono::Utc;
use market_core::{
    validate_symbol, CompositeAnalysis, CompositeIndicators, ComparisonResult, IndicatorKind,
    Interval, MarketSummary, Quote, ResponseEnvelope,
};
use std::collections::HashMap;

use crate::engine::{MarketDataEngine, ENGINE_SOURCE};

const ANALYZE_NEWS_LIMIT: u32 = 10;
const ANALYZE_SMA_PERIOD: u32 = 20;
const ANALYZE_RSI_PERIOD: u32 = 14;

impl MarketDataEngine {
    /// Fan out quote, overview, news, SMA and RSI lookups concurrently
    /// and assemble a best-effort composite. A field whose lookup failed
    /// is None; the analysis only fails when every constituent does.
    pub async fn analyze(&self, symbol: &str) -> ResponseEnvelope<CompositeAnalysis> {
        if let Err(e) = validate_symbol(symbol) {
            return ResponseEnvelope::err(e.to_string(), ENGINE_SOURCE);
        }

        tracing::info!(symbol, "starting composite analysis");
        let tickers = vec![symbol.to_string()];

        let (quote, overview, news, sma, rsi) = tokio::join!(
            self.get_quote(symbol),
            self.get_overview(symbol),
            self.get_news(Some(&tickers), None, ANALYZE_NEWS_LIMIT),
            self.get_indicator(symbol, IndicatorKind::Sma, Interval::Daily, ANALYZE_SMA_PERIOD),
            self.get_indicator(symbol, IndicatorKind::Rsi, Interval::Daily, ANALYZE_RSI_PERIOD),
        );

        let analysis = CompositeAnalysis {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            quote: quote.data,
            overview: overview.data,
            news: news.data,
            indicators: CompositeIndicators {
                sma: sma.data,
                rsi: rsi.data,
            },
        };

        let resolved = analysis.resolved_fields();
        if resolved == 0 {
            let reason = quote
                .error
                .unwrap_or_else(|| "all constituent lookups failed".to_string());
            return ResponseEnvelope::err(reason, ENGINE_SOURCE);
        }

        tracing::info!(symbol, resolved, of = 5usize, "composite analysis assembled");
        ResponseEnvelope::ok(analysis, ENGINE_SOURCE)
    }

    /// Compare several symbols: batch-resolve their quotes and derive a
    /// cross-sectional market summary. Unresolved symbols are absent from
    /// the quote map; the comparison fails only when nothing resolved.
    pub async fn compare(&self, symbols: &[String]) -> ResponseEnvelope<ComparisonResult> {
        if symbols.is_empty() {
            return ResponseEnvelope::err("no symbols to compare", ENGINE_SOURCE);
        }

        let batch = self.get_multiple_quotes(symbols).await;
        if batch.items.is_empty() {
            return ResponseEnvelope::err(
                format!("no quotes resolved for {} symbols", symbols.len()),
                ENGINE_SOURCE,
            );
        }

        let summary = market_summary(&batch.items);
        ResponseEnvelope::ok(
            ComparisonResult {
                resolved: batch.success_count,
                requested: symbols.len(),
                quotes: batch.items,
                summary,
                timestamp: Utc::now(),
            },
            ENGINE_SOURCE,
        )
    }
}

fn market_summary(quotes: &HashMap<String, Quote>) -> MarketSummary {
    let mut advancing = 0;
    let mut declining = 0;
    let mut unchanged = 0;
    let mut best: Option<(&String, f64)> = None;
    let mut worst: Option<(&String, f64)> = None;
    let mut total_change = 0.0;

    for (symbol, quote) in quotes {
        let pct = quote.change_percent;
        total_change += pct;

        if pct > 0.0 {
            advancing += 1;
        } else if pct < 0.0 {
            declining += 1;
        } else {
            unchanged += 1;
        }

        if best.is_none_or(|(_, b)| pct > b) {
            best = Some((symbol, pct));
        }
        if worst.is_none_or(|(_, w)| pct < w) {
            worst = Some((symbol, pct));
        }
    }

    MarketSummary {
        average_change_percent: total_change / quotes.len() as f64,
        advancing,
        declining,
        unchanged,
        best_performer: best.map(|(s, _)| s.clone()),
        worst_performer: worst.map(|(s, _)| s.clone()),
    }
}
