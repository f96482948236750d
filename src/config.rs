//! Configuration for the pool engine.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Configuration for the pool engine and its scheduling loop.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connection URL of the backing Redis store.
    pub redis_url: String,
    /// Name of the sorted set holding the pool.
    pub proxy_key: String,
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    /// Period of the scheduling loop.
    pub check_interval: Duration,
    /// Per-probe timeout during validation.
    pub proxy_timeout: Duration,
    /// Pool size below which acquisition is triggered.
    pub min_proxies: usize,
    /// Hard capacity of the store; lowest-scoring entries are trimmed past it.
    pub max_proxies: usize,
    /// Maximum age of the pool before a freshness crawl runs anyway.
    pub crawl_interval: Duration,
    /// Minimum spacing between two acquisition runs.
    pub crawl_min_interval: Duration,
    /// Number of concurrent validation probes.
    pub validate_concurrency: usize,
    /// Size of the top-ranked window `/proxy` samples from.
    pub sample_window: usize,
    /// Primary probe endpoint for http/socks proxies.
    pub probe_url: String,
    /// Alternate probe endpoint, also primary for https proxies.
    pub probe_fallback_url: String,
}

impl PoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset. A variable that is set but unparsable is
    /// a startup error.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();

        if let Ok(v) = env::var("REDIS_URL") {
            builder = builder.redis_url(v);
        }
        if let Ok(v) = env::var("PROXY_KEY") {
            builder = builder.proxy_key(v);
        }
        if let Ok(v) = env::var("BIND_ADDR") {
            builder = builder.bind_addr(v);
        }
        if let Some(v) = env_secs("CHECK_INTERVAL")? {
            builder = builder.check_interval(v);
        }
        if let Some(v) = env_secs("PROXY_TIMEOUT")? {
            builder = builder.proxy_timeout(v);
        }
        if let Some(v) = env_usize("MIN_PROXIES")? {
            builder = builder.min_proxies(v);
        }
        if let Some(v) = env_usize("MAX_PROXIES")? {
            builder = builder.max_proxies(v);
        }
        if let Some(v) = env_secs("CRAWL_INTERVAL")? {
            builder = builder.crawl_interval(v);
        }
        if let Some(v) = env_secs("CRAWL_MIN_INTERVAL")? {
            builder = builder.crawl_min_interval(v);
        }
        if let Some(v) = env_usize("VALIDATE_CONCURRENCY")? {
            builder = builder.validate_concurrency(v);
        }
        if let Some(v) = env_usize("SAMPLE_WINDOW")? {
            builder = builder.sample_window(v);
        }
        if let Ok(v) = env::var("PROBE_URL") {
            builder = builder.probe_url(v);
        }
        if let Ok(v) = env::var("PROBE_FALLBACK_URL") {
            builder = builder.probe_fallback_url(v);
        }

        Ok(builder.build())
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(v) => {
            let secs: u64 = v
                .parse()
                .with_context(|| format!("{name} must be a whole number of seconds, got {v:?}"))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(v) => {
            let n: usize = v
                .parse()
                .with_context(|| format!("{name} must be a non-negative integer, got {v:?}"))?;
            Ok(Some(n))
        }
        Err(_) => Ok(None),
    }
}

/// Builder for `PoolConfig`.
pub struct PoolConfigBuilder {
    redis_url: Option<String>,
    proxy_key: Option<String>,
    bind_addr: Option<String>,
    check_interval: Option<Duration>,
    proxy_timeout: Option<Duration>,
    min_proxies: Option<usize>,
    max_proxies: Option<usize>,
    crawl_interval: Option<Duration>,
    crawl_min_interval: Option<Duration>,
    validate_concurrency: Option<usize>,
    sample_window: Option<usize>,
    probe_url: Option<String>,
    probe_fallback_url: Option<String>,
}

impl PoolConfigBuilder {
    pub fn new() -> Self {
        Self {
            redis_url: None,
            proxy_key: None,
            bind_addr: None,
            check_interval: None,
            proxy_timeout: None,
            min_proxies: None,
            max_proxies: None,
            crawl_interval: None,
            crawl_min_interval: None,
            validate_concurrency: None,
            sample_window: None,
            probe_url: None,
            probe_fallback_url: None,
        }
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn proxy_key(mut self, key: impl Into<String>) -> Self {
        self.proxy_key = Some(key.into());
        self
    }

    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = Some(interval);
        self
    }

    pub fn proxy_timeout(mut self, timeout: Duration) -> Self {
        self.proxy_timeout = Some(timeout);
        self
    }

    pub fn min_proxies(mut self, count: usize) -> Self {
        self.min_proxies = Some(count);
        self
    }

    pub fn max_proxies(mut self, count: usize) -> Self {
        self.max_proxies = Some(count);
        self
    }

    pub fn crawl_interval(mut self, interval: Duration) -> Self {
        self.crawl_interval = Some(interval);
        self
    }

    pub fn crawl_min_interval(mut self, interval: Duration) -> Self {
        self.crawl_min_interval = Some(interval);
        self
    }

    pub fn validate_concurrency(mut self, permits: usize) -> Self {
        self.validate_concurrency = Some(permits);
        self
    }

    pub fn sample_window(mut self, window: usize) -> Self {
        self.sample_window = Some(window);
        self
    }

    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    pub fn probe_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.probe_fallback_url = Some(url.into());
        self
    }

    /// Build the configuration, applying defaults for anything unset.
    pub fn build(self) -> PoolConfig {
        PoolConfig {
            redis_url: self
                .redis_url
                .unwrap_or_else(|| "redis://127.0.0.1:6379/0".to_string()),
            proxy_key: self.proxy_key.unwrap_or_else(|| "proxies:valid".to_string()),
            bind_addr: self.bind_addr.unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            check_interval: self.check_interval.unwrap_or(Duration::from_secs(600)),
            proxy_timeout: self.proxy_timeout.unwrap_or(Duration::from_secs(10)),
            min_proxies: self.min_proxies.unwrap_or(50),
            max_proxies: self.max_proxies.unwrap_or(1000),
            crawl_interval: self.crawl_interval.unwrap_or(Duration::from_secs(1800)),
            crawl_min_interval: self.crawl_min_interval.unwrap_or(Duration::from_secs(300)),
            validate_concurrency: self.validate_concurrency.unwrap_or(50).max(1),
            sample_window: self.sample_window.unwrap_or(100).max(1),
            probe_url: self
                .probe_url
                .unwrap_or_else(|| "http://httpbin.org/ip".to_string()),
            probe_fallback_url: self
                .probe_fallback_url
                .unwrap_or_else(|| "https://httpbin.org/ip".to_string()),
        }
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_steady_state_policy() {
        let config = PoolConfig::builder().build();
        assert_eq!(config.proxy_key, "proxies:valid");
        assert_eq!(config.check_interval, Duration::from_secs(600));
        assert_eq!(config.min_proxies, 50);
        assert_eq!(config.max_proxies, 1000);
        assert_eq!(config.validate_concurrency, 50);
        assert_eq!(config.sample_window, 100);
    }

    #[test]
    fn builder_overrides_stick() {
        let config = PoolConfig::builder()
            .max_proxies(2)
            .check_interval(Duration::from_millis(50))
            .build();
        assert_eq!(config.max_proxies, 2);
        assert_eq!(config.check_interval, Duration::from_millis(50));
    }
}
