use std::time::Duration;

/// Engine configuration, consumed once at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Source id of the provider consulted first
    pub primary_source: String,
    /// Source id consulted when the primary fails or returns no data
    pub fallback_source: Option<String>,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    /// Identifiers per batch chunk
    pub batch_chunk_size: usize,
    /// Pause between consecutive batch chunks
    pub batch_delay: Duration,
    /// Extra primary attempts before the fallback is consulted (0 = off)
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            primary_source: "alpha_vantage".to_string(),
            fallback_source: Some("yahoo".to_string()),
            cache_enabled: true,
            cache_ttl: Duration::from_secs(60),
            batch_chunk_size: 10,
            batch_delay: Duration::from_millis(100),
            retry_attempts: 0,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `MARKET_*` environment knobs
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("MARKET_PRIMARY_SOURCE") {
            config.primary_source = v;
        }
        if let Ok(v) = std::env::var("MARKET_FALLBACK_SOURCE") {
            config.fallback_source = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = env_parse::<bool>("MARKET_CACHE_ENABLED") {
            config.cache_enabled = v;
        }
        if let Some(v) = env_parse::<u64>("MARKET_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("MARKET_BATCH_CHUNK_SIZE") {
            config.batch_chunk_size = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("MARKET_BATCH_DELAY_MS") {
            config.batch_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("MARKET_RETRY_ATTEMPTS") {
            config.retry_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("MARKET_RETRY_DELAY_MS") {
            config.retry_delay = Duration::from_millis(v);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.primary_source, "alpha_vantage");
        assert_eq!(config.fallback_source.as_deref(), Some("yahoo"));
        assert!(config.cache_enabled);
        assert_eq!(config.batch_chunk_size, 10);
        assert_eq!(config.batch_delay, Duration::from_millis(100));
        assert_eq!(config.retry_attempts, 0);
    }
}
