//! Liveness verifier probing each candidate through its own protocol
//!
//! Each registry entry is tested exactly once, with the strongest protocol
//! it is known to speak. Probes run concurrently behind a semaphore so that
//! thousands of candidates never turn into thousands of open sockets.

use crate::error::ProbeError;
use crate::proxy::crawler::DEFAULT_USER_AGENT;
use crate::proxy::geo::GeoLocator;
use crate::proxy::models::{ProbeOutcome, ProxyType, RawProxyRecord, VerifiedProxy};
use crate::proxy::registry::ProxyRegistry;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Proxy as ReqwestProxy, Url};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::lookup_host;
use tokio::sync::Semaphore;
use tokio_socks::tcp::Socks4Stream;
use tracing::{debug, info, instrument, warn};

/// Default timeout for proxy checks in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of concurrent checks
pub const DEFAULT_CONCURRENCY: usize = 500;

/// Default URL to test proxies against
pub const DEFAULT_TEST_URL: &str = "http://httpbin.org/ip";

/// Largest status line read back from a SOCKS4 probe
const MAX_STATUS_LINE: usize = 1024;

/// Ability to send one GET through a proxy and report the status code
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn probe(
        &self,
        address: &str,
        protocol: ProxyType,
        target_url: &str,
        timeout: Duration,
    ) -> Result<u16, ProbeError>;
}

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Total budget for each probe
    pub timeout: Duration,
    /// Number of probes in flight at once
    pub concurrency: usize,
    /// URL to test proxies against
    pub test_url: String,
    /// Path to MMDB file for filling unknown geography (optional)
    pub mmdb_path: Option<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            test_url: DEFAULT_TEST_URL.to_string(),
            mmdb_path: None,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_mmdb_path(mut self, path: String) -> Self {
        self.mmdb_path = Some(path);
        self
    }
}

/// `ProxyProbe` backed by reqwest for HTTP and SOCKS5 proxies and by a raw
/// SOCKS4 handshake for SOCKS4 proxies
#[derive(Debug, Clone, Default)]
pub struct ReqwestProber;

impl ReqwestProber {
    pub fn new() -> Self {
        Self
    }

    /// Create a reqwest client routed through the proxy
    fn create_client(
        address: &str,
        protocol: ProxyType,
        timeout: Duration,
    ) -> Result<Client, ProbeError> {
        let proxy_url = format!("{}://{}", protocol.transport_scheme(), address);
        let reqwest_proxy = ReqwestProxy::all(&proxy_url)?;

        let client = Client::builder()
            .proxy(reqwest_proxy)
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(client)
    }

    /// IPv4 address of the test target, resolved on this side of the proxy
    async fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddrV4, ProbeError> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(SocketAddrV4::new(ip, port));
        }

        lookup_host((host, port))
            .await?
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(v4),
                SocketAddr::V6(_) => None,
            })
            .ok_or_else(|| ProbeError::InvalidTarget(format!("{} has no IPv4 address", host)))
    }

    async fn probe_socks4(address: &str, target: &Url) -> Result<u16, ProbeError> {
        if target.scheme() != "http" {
            return Err(ProbeError::InvalidTarget(format!(
                "SOCKS4 probes need an http:// target, got {}",
                target
            )));
        }
        let host = target
            .host_str()
            .ok_or_else(|| ProbeError::InvalidTarget(target.to_string()))?;
        let port = target
            .port_or_known_default()
            .ok_or_else(|| ProbeError::InvalidTarget(target.to_string()))?;

        // Plain SOCKS4 only carries an IPv4 destination; a hostname would
        // turn the request into SOCKS4a, which many proxies refuse
        let destination = Self::resolve_ipv4(host, port).await?;
        let mut stream = Socks4Stream::connect(address, SocketAddr::V4(destination))
            .await?
            .into_inner();

        let path = match target.query() {
            Some(query) => format!("{}?{}", target.path(), query),
            None => target.path().to_string(),
        };
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
            path, host, DEFAULT_USER_AGENT
        );
        stream.write_all(request.as_bytes()).await?;

        let mut response = Vec::with_capacity(256);
        let mut chunk = [0u8; 256];
        while !response.windows(2).any(|w| w == b"\r\n") && response.len() < MAX_STATUS_LINE {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&chunk[..n]);
        }

        parse_status_line(&response)
    }
}

#[async_trait]
impl ProxyProbe for ReqwestProber {
    async fn probe(
        &self,
        address: &str,
        protocol: ProxyType,
        target_url: &str,
        timeout: Duration,
    ) -> Result<u16, ProbeError> {
        let target =
            Url::parse(target_url).map_err(|e| ProbeError::InvalidTarget(e.to_string()))?;

        if protocol == ProxyType::Socks4 {
            return Self::probe_socks4(address, &target).await;
        }

        let client = Self::create_client(address, protocol, timeout)?;
        let response = client.get(target).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Read the status code out of an HTTP/1.x status line
pub fn parse_status_line(response: &[u8]) -> Result<u16, ProbeError> {
    let text = String::from_utf8_lossy(response);
    let line = text.lines().next().unwrap_or_default();
    let mut parts = line.split_whitespace();

    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse()
            .map_err(|_| ProbeError::Protocol(format!("bad status line: {}", line))),
        _ => Err(ProbeError::Protocol(format!("bad status line: {}", line))),
    }
}

/// Outcome of verifying a whole registry
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Working proxies, fastest first
    pub verified: Vec<VerifiedProxy>,
    /// Candidates probed
    pub checked: usize,
    /// Probes that errored or returned a non-200 status
    pub failed: usize,
    /// Probes that ran out of time
    pub timed_out: usize,
}

/// Proxy checker for validating proxies
#[derive(Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
    probe: Arc<dyn ProxyProbe>,
    geo_locator: Option<GeoLocator>,
}

impl ProxyChecker {
    pub fn new(config: CheckerConfig, probe: Arc<dyn ProxyProbe>) -> Self {
        let geo_locator = config.mmdb_path.as_ref().and_then(|path| {
            GeoLocator::from_path(path)
                .map_err(|e| warn!("Could not open MMDB {}: {}", path, e))
                .ok()
        });

        Self {
            config,
            probe,
            geo_locator,
        }
    }

    /// Checker using the reqwest-backed prober
    pub fn with_config(config: CheckerConfig) -> Self {
        Self::new(config, Arc::new(ReqwestProber::new()))
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Probe one candidate with its preferred protocol
    #[instrument(skip(self, record), fields(proxy = %record.key()))]
    pub async fn check_candidate(&self, record: &RawProxyRecord) -> ProbeOutcome {
        let protocol = record.preferred_protocol();
        let address = record.key();
        let start = Instant::now();

        let result = tokio::time::timeout(
            self.config.timeout,
            self.probe
                .probe(&address, protocol, &self.config.test_url, self.config.timeout),
        )
        .await;

        let outcome = match result {
            Ok(Ok(200)) => ProbeOutcome::Working {
                latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
            Ok(Ok(status)) => ProbeOutcome::Failed(format!("HTTP status: {}", status)),
            Ok(Err(ProbeError::Timeout)) | Err(_) => ProbeOutcome::Timeout,
            Ok(Err(e)) => ProbeOutcome::Failed(e.to_string()),
        };
        debug!("{} via {}: {:?}", address, protocol, outcome);
        outcome
    }

    /// Probe every registry entry with at most `concurrency` probes in
    /// flight, and return the survivors sorted by latency
    pub async fn check_registry(&self, registry: &ProxyRegistry) -> VerifyReport {
        let limit = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        info!(
            "Checking {} proxies with {} concurrent probes, timeout {}s",
            registry.len(),
            limit,
            self.config.timeout.as_secs()
        );

        let results = stream::iter(registry.iter())
            .map(|record| {
                let sem = Arc::clone(&semaphore);
                async move {
                    // The permit is dropped on every return path, including
                    // timeouts, which frees the slot for the next candidate
                    let outcome = match sem.acquire().await {
                        Ok(_permit) => self.check_candidate(record).await,
                        Err(_) => ProbeOutcome::Failed("probe gate closed".to_string()),
                    };
                    (record, outcome)
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await;

        let mut report = VerifyReport {
            checked: results.len(),
            ..VerifyReport::default()
        };

        for (record, outcome) in results {
            match outcome {
                ProbeOutcome::Working { latency_ms } => {
                    let mut verified =
                        VerifiedProxy::new(record.clone(), record.preferred_protocol(), latency_ms);
                    self.fill_geography(&mut verified);
                    report.verified.push(verified);
                }
                ProbeOutcome::Failed(_) => report.failed += 1,
                ProbeOutcome::Timeout => report.timed_out += 1,
            }
        }

        report.verified.sort_by(|a, b| {
            a.latency_ms
                .cmp(&b.latency_ms)
                .then_with(|| a.address().cmp(&b.address()))
        });

        info!(
            "Verification complete: {} working, {} failed, {} timed out",
            report.verified.len(),
            report.failed,
            report.timed_out
        );

        report
    }

    fn fill_geography(&self, verified: &mut VerifiedProxy) {
        if let Some(geo) = &self.geo_locator {
            geo.annotate(verified);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted probe: per-address delay and status, recording every call
    #[derive(Default)]
    struct ScriptedProbe {
        script: HashMap<String, (Duration, Result<u16, ProbeError>)>,
        calls: Mutex<Vec<(String, ProxyType)>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedProbe {
        fn with(mut self, address: &str, delay_ms: u64, result: Result<u16, ProbeError>) -> Self {
            self.script
                .insert(address.to_string(), (Duration::from_millis(delay_ms), result));
            self
        }
    }

    #[async_trait]
    impl ProxyProbe for ScriptedProbe {
        async fn probe(
            &self,
            address: &str,
            protocol: ProxyType,
            _target_url: &str,
            _timeout: Duration,
        ) -> Result<u16, ProbeError> {
            self.calls
                .lock()
                .unwrap()
                .push((address.to_string(), protocol));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let (delay, result) = self
                .script
                .get(address)
                .cloned()
                .unwrap_or((Duration::from_millis(10), Ok(200)));
            tokio::time::sleep(delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn http_registry(entries: &[(&str, u16)]) -> ProxyRegistry {
        let mut registry = ProxyRegistry::new();
        for (host, port) in entries {
            registry.merge(
                RawProxyRecord::new(host.to_string(), *port, "test".to_string())
                    .with_protocols([ProxyType::Http]),
            );
        }
        registry
    }

    fn checker(probe: Arc<ScriptedProbe>, timeout_ms: u64, concurrency: usize) -> ProxyChecker {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_millis(timeout_ms))
            .with_concurrency(concurrency);
        ProxyChecker::new(config, probe)
    }

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.test_url, DEFAULT_TEST_URL);
        assert!(config.mmdb_path.is_none());
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_concurrency(20)
            .with_test_url("http://example.com".to_string());

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency, 20);
        assert_eq!(config.test_url, "http://example.com");
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(parse_status_line(b"HTTP/1.1 200 OK\r\n"), Ok(200));
        assert_eq!(parse_status_line(b"HTTP/1.0 403 Forbidden\r\n\r\n"), Ok(403));
        assert!(parse_status_line(b"").is_err());
        assert!(parse_status_line(b"SSH-2.0-OpenSSH\r\n").is_err());
    }

    #[tokio::test]
    async fn test_probes_only_strongest_protocol() {
        let probe = Arc::new(ScriptedProbe::default());
        let mut registry = ProxyRegistry::new();
        registry.merge(
            RawProxyRecord::new("1.1.1.1".to_string(), 1080, "test".to_string()).with_protocols([
                ProxyType::Http,
                ProxyType::Socks4,
                ProxyType::Socks5,
            ]),
        );

        let report = checker(probe.clone(), 1000, 10).check_registry(&registry).await;

        let calls = probe.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("1.1.1.1:1080".to_string(), ProxyType::Socks5)]);
        assert_eq!(report.verified.len(), 1);
        assert_eq!(report.verified[0].verified_protocol, ProxyType::Socks5);
    }

    #[tokio::test]
    async fn test_timeout_excludes_candidate() {
        let probe = Arc::new(
            ScriptedProbe::default()
                .with("1.2.3.4:8080", 5_000, Ok(200))
                .with("5.6.7.8:3128", 5, Ok(200)),
        );
        let registry = http_registry(&[("1.2.3.4", 8080), ("5.6.7.8", 3128)]);

        let report = checker(probe, 100, 10).check_registry(&registry).await;

        assert_eq!(report.checked, 2);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.verified.len(), 1);
        assert_eq!(report.verified[0].address(), "5.6.7.8:3128");
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let probe = Arc::new(
            ScriptedProbe::default()
                .with("10.0.0.1:80", 1, Ok(407))
                .with("10.0.0.2:80", 1, Err(ProbeError::Connect("refused".to_string())))
                .with("10.0.0.3:80", 1, Err(ProbeError::Timeout)),
        );
        let registry = http_registry(&[("10.0.0.1", 80), ("10.0.0.2", 80), ("10.0.0.3", 80)]);

        let report = checker(probe, 1000, 10).check_registry(&registry).await;
        assert!(report.verified.is_empty());
        assert_eq!(report.failed, 2);
        assert_eq!(report.timed_out, 1);
    }

    #[tokio::test]
    async fn test_results_sorted_by_latency() {
        let probe = Arc::new(
            ScriptedProbe::default()
                .with("10.0.0.1:80", 120, Ok(200))
                .with("10.0.0.2:80", 10, Ok(200))
                .with("10.0.0.3:80", 60, Ok(200)),
        );
        let registry = http_registry(&[("10.0.0.1", 80), ("10.0.0.2", 80), ("10.0.0.3", 80)]);

        let report = checker(probe, 2000, 10).check_registry(&registry).await;
        assert_eq!(report.verified.len(), 3);
        assert!(report
            .verified
            .windows(2)
            .all(|w| w[0].latency_ms <= w[1].latency_ms));
        assert_eq!(report.verified[0].address(), "10.0.0.2:80");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let probe = Arc::new(ScriptedProbe::default());
        let hosts: Vec<String> = (0..40).map(|i| format!("10.1.0.{}", i)).collect();
        let entries: Vec<(&str, u16)> = hosts.iter().map(|h| (h.as_str(), 8080)).collect();
        let registry = http_registry(&entries);

        let report = checker(probe.clone(), 1000, 4).check_registry(&registry).await;

        assert_eq!(report.verified.len(), 40);
        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 4, "peak in-flight probes was {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let probe = Arc::new(ScriptedProbe::default());
        let report = checker(probe, 100, 0).check_registry(&ProxyRegistry::new()).await;
        assert_eq!(report.checked, 0);
        assert!(report.verified.is_empty());
    }

    #[tokio::test]
    async fn test_socks4_target_ip_literal_is_used_as_is() {
        let addr = ReqwestProber::resolve_ipv4("93.184.216.34", 80).await.unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(93, 184, 216, 34), 80));
    }

    #[tokio::test]
    async fn test_socks4_needs_http_target() {
        let target = Url::parse("https://example.com/ip").unwrap();
        let result = ReqwestProber::probe_socks4("127.0.0.1:1080", &target).await;
        assert!(matches!(result, Err(ProbeError::InvalidTarget(_))));
    }
}
