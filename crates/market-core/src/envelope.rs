use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CompanyOverview, MarketStatus, NewsItem, Quote, SymbolMatch, TechnicalIndicator, TimeSeries};

/// Annotations describing how a response was resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// True when the fallback source answered instead of the primary
    pub fallback: bool,
    pub primary_error: Option<String>,
    pub fallback_error: Option<String>,
}

/// Uniform response wrapper shared by adapters and the engine.
/// Invariant: `success == data.is_some()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Identifier of the source that resolved (or failed) the call
    pub source: String,
    pub cached: bool,
    pub meta: Option<ResponseMeta>,
}

impl<T> ResponseEnvelope<T> {
    pub fn ok(data: T, source: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            source: source.into(),
            cached: false,
            meta: None,
        }
    }

    pub fn err(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: Utc::now(),
            source: source.into(),
            cached: false,
            meta: None,
        }
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Map the payload type, keeping annotations
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResponseEnvelope<U> {
        ResponseEnvelope {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            timestamp: self.timestamp,
            source: self.source,
            cached: self.cached,
            meta: self.meta,
        }
    }
}

/// Lets the fallback executor treat a successful-but-empty payload as a
/// miss worth consulting the fallback for. Scalar records are never empty;
/// collection payloads report their emptiness.
pub trait EmptyPayload {
    fn is_empty_payload(&self) -> bool {
        false
    }
}

impl EmptyPayload for Quote {}
impl EmptyPayload for CompanyOverview {}
impl EmptyPayload for MarketStatus {}
impl EmptyPayload for crate::SymbolValidation {}

impl EmptyPayload for TimeSeries {
    fn is_empty_payload(&self) -> bool {
        self.bars.is_empty()
    }
}

impl EmptyPayload for TechnicalIndicator {
    fn is_empty_payload(&self) -> bool {
        self.points.is_empty()
    }
}

impl<T> EmptyPayload for Vec<T> {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

// Blanket coverage for news and search lists comes from the Vec impl;
// keep the concrete aliases documented here.
impl EmptyPayload for NewsItem {}
impl EmptyPayload for SymbolMatch {}
