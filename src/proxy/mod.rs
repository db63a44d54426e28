//! Proxy module for collecting and checking proxies
//!
//! This module provides functionality for:
//! - Fetching proxy listings from a static catalog of sources
//! - Normalizing JSON and plain-text listings into one deduplicated registry
//! - Checking proxy liveness with bounded concurrency
//! - Writing latency-ranked reports

pub mod checker;
pub mod crawler;
pub mod geo;
pub mod harvester;
pub mod models;
pub mod parser;
pub mod registry;
pub mod sources;
pub mod writer;

pub use checker::{CheckerConfig, ProxyChecker, ProxyProbe, ReqwestProber, VerifyReport};
pub use crawler::{
    CrawlerConfig, FetchResponse, FetchedSource, HttpFetch, ReqwestFetcher, SourceFetcher,
};
pub use geo::{GeoLocation, GeoLocator};
pub use harvester::{Harvest, Harvester, RunSummary};
pub use models::{ProbeOutcome, ProxyType, RawProxyRecord, VerifiedProxy};
pub use parser::{NormalizeStats, ProxyParser};
pub use registry::{MergeOutcome, ProxyRegistry};
pub use sources::{default_catalog, FormatHint, SourceDescriptor};
pub use writer::{ReportHeader, ResultWriter};
