//! Source fetcher for downloading raw proxy listings
//!
//! Every source in the catalog is fetched concurrently. A source that times
//! out, answers with anything other than 200, or fails in transport simply
//! contributes no content; the other sources are unaffected.

use crate::error::FetchError;
use crate::proxy::sources::{SourceDescriptor, SLOW_FETCH_TIMEOUT};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default user agent for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!(
    "proxy-harvest/",
    env!("CARGO_PKG_VERSION"),
    " (public proxy list aggregator)"
);

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// Ability to GET a URL within a time budget
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// Configuration for the reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Ceiling on any single fetch; source budgets above it are clamped
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout: SLOW_FETCH_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// `HttpFetch` over a shared reqwest client
pub struct ReqwestFetcher {
    client: Client,
    max_timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new() -> crate::Result<Self> {
        Self::with_config(CrawlerConfig::default())
    }

    pub fn with_config(config: CrawlerConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            max_timeout: config.timeout,
        })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let timeout = timeout.min(self.max_timeout);
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest(e, timeout))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest(e, timeout))?;

        Ok(FetchResponse { status, body })
    }
}

fn classify_reqwest(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        err.into()
    }
}

/// Result of fetching a single source
#[derive(Debug, Clone)]
pub struct FetchedSource {
    /// The source that was fetched
    pub source: SourceDescriptor,
    /// Body on HTTP 200, otherwise why there is none
    pub outcome: Result<String, FetchError>,
}

impl FetchedSource {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Fans out fetches over the source catalog
#[derive(Clone)]
pub struct SourceFetcher {
    http: Arc<dyn HttpFetch>,
}

impl SourceFetcher {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }

    /// Fetch one source, turning every failure into a `FetchError`
    #[instrument(skip(self, source), fields(url = %source.url))]
    pub async fn fetch_source(&self, source: &SourceDescriptor) -> Result<String, FetchError> {
        let budget = source.timeout;
        let response = tokio::time::timeout(budget, self.http.fetch(&source.url, budget))
            .await
            .map_err(|_| FetchError::Timeout(budget))??;

        if response.status != 200 {
            return Err(FetchError::Status(response.status));
        }
        debug!("Fetched {} bytes", response.body.len());
        Ok(response.body)
    }

    /// Fetch every source concurrently; results come back in catalog order
    pub async fn fetch_all(&self, sources: &[SourceDescriptor]) -> Vec<FetchedSource> {
        let fetches = sources.iter().map(|source| async move {
            let outcome = self.fetch_source(source).await;
            if let Err(ref e) = outcome {
                warn!("Failed to fetch {}: {}", source.url, e);
            }
            FetchedSource {
                source: source.clone(),
                outcome,
            }
        });

        let results = join_all(fetches).await;
        let ok = results.iter().filter(|r| r.is_success()).count();
        info!("Fetched {}/{} sources", ok, results.len());
        results
    }
}
