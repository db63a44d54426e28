//! Static catalog of proxy list sources

use crate::proxy::models::ProxyType;
use std::time::Duration;

/// Fetch budget for ordinary sources
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetch budget for sources known to respond slowly
pub const SLOW_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Expected payload shape of a source. The payload itself decides how it is
/// parsed; the hint is only compared against what was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Json,
    Lines,
}

/// A remote proxy listing
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    /// URL to fetch proxies from
    pub url: String,
    pub format_hint: FormatHint,
    /// Protocols assumed for entries that carry no protocol of their own
    pub implied_protocols: Vec<ProxyType>,
    /// Fetch budget for this source
    pub timeout: Duration,
}

impl SourceDescriptor {
    pub fn new(url: &str, format_hint: FormatHint, implied_protocols: &[ProxyType]) -> Self {
        Self {
            url: url.to_string(),
            format_hint,
            implied_protocols: implied_protocols.to_vec(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Plain-text `host:port` listing dedicated to one protocol
    pub fn lines(url: &str, protocol: ProxyType) -> Self {
        Self::new(url, FormatHint::Lines, &[protocol])
    }

    pub fn json(url: &str) -> Self {
        Self::new(url, FormatHint::Json, &[])
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Host part of the URL, used as the record's origin label
    pub fn name(&self) -> String {
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.url.clone())
    }

    /// Protocols for entries without an explicit scheme; `http` when the
    /// source implies nothing
    pub fn fallback_protocols(&self) -> Vec<ProxyType> {
        if self.implied_protocols.is_empty() {
            vec![ProxyType::Http]
        } else {
            self.implied_protocols.clone()
        }
    }
}

/// The built-in source list, in ingestion order
pub fn default_catalog() -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor::json(
            "https://proxylist.geonode.com/api/proxy-list?limit=500&page=1&sort_by=lastChecked&sort_type=desc&protocols=http%2Chttps%2Csocks4%2Csocks5",
        )
        .with_timeout(SLOW_FETCH_TIMEOUT),
        SourceDescriptor::lines(
            "https://www.proxy-list.download/api/v1/get?type=http",
            ProxyType::Http,
        ),
        SourceDescriptor::lines(
            "https://www.proxy-list.download/api/v1/get?type=https",
            ProxyType::Https,
        ),
        SourceDescriptor::lines(
            "https://www.proxy-list.download/api/v1/get?type=socks4",
            ProxyType::Socks4,
        ),
        SourceDescriptor::lines(
            "https://www.proxy-list.download/api/v1/get?type=socks5",
            ProxyType::Socks5,
        ),
        SourceDescriptor::lines(
            "https://api.proxyscrape.com/v2/?request=displayproxies&protocol=http&timeout=10000",
            ProxyType::Http,
        ),
        SourceDescriptor::lines(
            "https://api.proxyscrape.com/v2/?request=displayproxies&protocol=socks4&timeout=10000",
            ProxyType::Socks4,
        ),
        SourceDescriptor::lines(
            "https://api.proxyscrape.com/v2/?request=displayproxies&protocol=socks5&timeout=10000",
            ProxyType::Socks5,
        ),
    ]
}
