//! Aggregation engine over multiple market data providers.
//!
//! Decides which provider answers a query, when cached results are served
//! instead, how bulk requests are chunked and paced against upstream rate
//! limits, and how independent lookups combine into one composite analysis.
//! Providers and the cache are passed in at construction so they can be
//! substituted with test doubles.

pub mod batch;
pub mod cache;
pub mod config;
pub mod engine;
pub mod fallback;
mod orchestrator;
#[cfg(test)]
pub(crate) mod testutil;

pub use batch::{BatchFetcher, BatchResult};
pub use cache::{CacheStats, CacheStore};
pub use config::EngineConfig;
pub use engine::MarketDataEngine;
pub use fallback::FallbackExecutor;
