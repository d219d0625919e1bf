use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("No data returned: {0}")]
    NoData(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Unknown data source: {0}")]
    UnknownSource(String),
}
