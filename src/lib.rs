//! Proxy Harvest - public proxy aggregator and checker
//!
//! Collects candidate proxies from a fixed set of public listings, merges
//! them into one deduplicated registry, verifies each through its own
//! protocol with bounded concurrency, and writes a latency-ranked report.

pub mod error;
pub mod proxy;

pub use error::{FetchError, OutputError, ProbeError};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Sources to collect from, in ingestion order
    pub sources: Vec<SourceDescriptor>,
    /// HTTP client settings for fetching sources
    pub crawler: CrawlerConfig,
    /// Probe settings for verification
    pub checker: CheckerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: default_catalog(),
            crawler: CrawlerConfig::default(),
            checker: CheckerConfig::default(),
        }
    }
}
