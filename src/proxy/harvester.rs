//! End-to-end pipeline: fetch, normalize, verify
//!
//! Fetching fans out over every source at once. Normalization only starts
//! once every fetch has settled and runs sources one after another in
//! catalog order, so the registry has a single writer and the first source
//! to report a proxy is recorded as its origin. Verification then reads the
//! finished registry.

use crate::proxy::checker::{ProxyChecker, VerifyReport};
use crate::proxy::crawler::{FetchedSource, ReqwestFetcher, SourceFetcher};
use crate::proxy::parser::{NormalizeStats, ProxyParser};
use crate::proxy::registry::ProxyRegistry;
use crate::proxy::sources::SourceDescriptor;
use crate::{Config, Result};
use std::sync::Arc;
use tracing::info;

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources: usize,
    pub sources_failed: usize,
    /// Entries accepted across all sources, duplicates included
    pub accepted: usize,
    /// Lines or records rejected by validation
    pub rejected: usize,
    /// Unique `host:port` keys in the registry
    pub candidates: usize,
    pub verified: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl RunSummary {
    fn add_source(&mut self, stats: &NormalizeStats) {
        self.accepted += stats.accepted();
        self.rejected += stats.rejected;
    }

    fn add_report(&mut self, report: &VerifyReport) {
        self.verified = report.verified.len();
        self.failed = report.failed;
        self.timed_out = report.timed_out;
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct Harvest {
    pub registry: ProxyRegistry,
    pub report: VerifyReport,
    pub summary: RunSummary,
}

/// Drives the aggregation and verification pipeline
pub struct Harvester {
    sources: Vec<SourceDescriptor>,
    fetcher: SourceFetcher,
    checker: ProxyChecker,
}

impl Harvester {
    pub fn new(
        sources: Vec<SourceDescriptor>,
        fetcher: SourceFetcher,
        checker: ProxyChecker,
    ) -> Self {
        Self {
            sources,
            fetcher,
            checker,
        }
    }

    /// Harvester backed by reqwest for both fetching and probing
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = ReqwestFetcher::with_config(config.crawler.clone())?;
        Ok(Self::new(
            config.sources.clone(),
            SourceFetcher::new(Arc::new(http)),
            ProxyChecker::with_config(config.checker.clone()),
        ))
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Fetch every source and build the registry
    pub async fn collect(&self) -> (ProxyRegistry, RunSummary) {
        let fetched = self.fetcher.fetch_all(&self.sources).await;
        let mut registry = ProxyRegistry::new();
        let summary = Self::normalize_all(&fetched, &mut registry);
        (registry, summary)
    }

    /// Merge fetched payloads into `registry` in the order given
    pub fn normalize_all(fetched: &[FetchedSource], registry: &mut ProxyRegistry) -> RunSummary {
        let mut summary = RunSummary {
            sources: fetched.len(),
            ..RunSummary::default()
        };

        for result in fetched {
            let content = match &result.outcome {
                Ok(content) => content,
                Err(_) => {
                    summary.sources_failed += 1;
                    continue;
                }
            };
            let stats = ProxyParser::normalize(content, &result.source, registry);
            info!(
                "{}: {} accepted ({} new), {} rejected",
                result.source.name(),
                stats.accepted(),
                stats.inserted,
                stats.rejected
            );
            summary.add_source(&stats);
        }

        summary.candidates = registry.len();
        info!(
            "Collected {} unique proxies from {} sources ({} unreachable)",
            summary.candidates, summary.sources, summary.sources_failed
        );
        summary
    }

    /// Full run: collect, then verify the finished registry
    pub async fn run(&self) -> Harvest {
        let (registry, mut summary) = self.collect().await;
        let report = self.checker.check_registry(&registry).await;
        summary.add_report(&report);

        Harvest {
            registry,
            report,
            summary,
        }
    }
}
