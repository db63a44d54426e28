//! Proxy data models

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Placeholder for geography no source has reported yet
pub const UNKNOWN: &str = "Unknown";

/// Proxy protocol tag
///
/// Variants are declared weakest first, so the derived `Ord` matches the
/// probe preference: `socks5 > socks4 > https > http`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyType {
    /// Scheme used to reach the proxy itself. HTTPS proxies are driven as
    /// plain HTTP forward proxies.
    pub fn transport_scheme(&self) -> &'static str {
        match self {
            ProxyType::Http | ProxyType::Https => "http",
            ProxyType::Socks4 => "socks4",
            ProxyType::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks4" | "socks4a" => Ok(ProxyType::Socks4),
            "socks5" | "socks5h" => Ok(ProxyType::Socks5),
            other => Err(format!(
                "Invalid proxy type: {}. Use: http, https, socks4, socks5",
                other
            )),
        }
    }
}

/// A candidate proxy as collected from one or more sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProxyRecord {
    pub host: String,
    pub port: u16,
    pub protocols: BTreeSet<ProxyType>,
    pub country: String,
    pub city: String,
    pub origin_source: String,
}

impl RawProxyRecord {
    /// Create a record with unknown geography
    pub fn new(host: String, port: u16, origin_source: String) -> Self {
        Self {
            host,
            port,
            protocols: BTreeSet::new(),
            country: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            origin_source,
        }
    }

    pub fn with_protocols<I>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = ProxyType>,
    {
        self.protocols.extend(protocols);
        self
    }

    /// Set geography; empty or missing values normalize to "Unknown"
    pub fn with_geography(mut self, country: Option<&str>, city: Option<&str>) -> Self {
        self.country = normalize_geo(country);
        self.city = normalize_geo(city);
        self
    }

    /// Fill geography that is still unknown from another report of the
    /// same proxy. A known country is never replaced, and a city is only
    /// taken when the country reported with it matches this record's.
    /// Returns whether anything changed.
    pub fn fill_geography(&mut self, country: Option<&str>, city: Option<&str>) -> bool {
        let country = normalize_geo(country);
        let city = normalize_geo(city);
        let mut changed = false;

        if !is_known(&self.country) && is_known(&country) {
            self.country = country.clone();
            changed = true;
        }

        let same_country = if is_known(&country) {
            self.country.eq_ignore_ascii_case(&country)
        } else {
            !is_known(&self.country)
        };
        if !is_known(&self.city) && is_known(&city) && same_country {
            self.city = city;
            changed = true;
        }

        changed
    }

    /// Registry key in `host:port` form
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Human-readable location: "City, Country", "Country", or "Unknown"
    pub fn location(&self) -> String {
        let has_country = is_known(&self.country);
        let has_city = is_known(&self.city);
        match (has_city, has_country) {
            (true, true) => format!("{}, {}", self.city, self.country),
            (_, true) => self.country.clone(),
            _ => UNKNOWN.to_string(),
        }
    }

    /// The single protocol the verifier tests for this candidate
    pub fn preferred_protocol(&self) -> ProxyType {
        self.protocols.iter().max().copied().unwrap_or_default()
    }
}

/// Whether a geography field carries a real value
pub fn is_known(value: &str) -> bool {
    !value.is_empty() && !value.eq_ignore_ascii_case(UNKNOWN)
}

fn normalize_geo(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if is_known(v) => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// A candidate that answered the probe with HTTP 200
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedProxy {
    #[serde(flatten)]
    pub record: RawProxyRecord,
    pub verified_protocol: ProxyType,
    pub latency_ms: u64,
}

impl VerifiedProxy {
    pub fn new(record: RawProxyRecord, verified_protocol: ProxyType, latency_ms: u64) -> Self {
        Self {
            record,
            verified_protocol,
            latency_ms,
        }
    }

    pub fn address(&self) -> String {
        self.record.key()
    }

    /// Fill geography that is still unknown. Known values are never replaced.
    pub fn fill_geography(&mut self, country: Option<&str>, city: Option<&str>) {
        self.record.fill_geography(country, city);
    }
}

/// Result of probing one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Working { latency_ms: u64 },
    Failed(String),
    Timeout,
}

impl ProbeOutcome {
    pub fn is_working(&self) -> bool {
        matches!(self, ProbeOutcome::Working { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RawProxyRecord {
        RawProxyRecord::new("1.2.3.4".to_string(), 8080, "test".to_string())
    }

    #[test]
    fn test_record_defaults() {
        let r = record();
        assert_eq!(r.key(), "1.2.3.4:8080");
        assert_eq!(r.country, UNKNOWN);
        assert_eq!(r.city, UNKNOWN);
        assert!(r.protocols.is_empty());
        assert_eq!(r.location(), "Unknown");
    }

    #[test]
    fn test_location_formats() {
        let r = record().with_geography(Some("DE"), Some("Berlin"));
        assert_eq!(r.location(), "Berlin, DE");

        let r = record().with_geography(Some("US"), None);
        assert_eq!(r.location(), "US");

        // A city without a country is not enough for a location
        let r = record().with_geography(None, Some("Paris"));
        assert_eq!(r.location(), "Unknown");

        let r = record().with_geography(Some(""), Some("  "));
        assert_eq!(r.country, UNKNOWN);
        assert_eq!(r.city, UNKNOWN);
    }

    #[test]
    fn test_preferred_protocol() {
        let r = record().with_protocols([ProxyType::Http, ProxyType::Socks4, ProxyType::Socks5]);
        assert_eq!(r.preferred_protocol(), ProxyType::Socks5);

        let r = record().with_protocols([ProxyType::Http, ProxyType::Https]);
        assert_eq!(r.preferred_protocol(), ProxyType::Https);

        let r = record().with_protocols([ProxyType::Socks4, ProxyType::Https]);
        assert_eq!(r.preferred_protocol(), ProxyType::Socks4);

        assert_eq!(record().preferred_protocol(), ProxyType::Http);
    }

    #[test]
    fn test_proxy_type_from_str() {
        assert_eq!("HTTP".parse::<ProxyType>(), Ok(ProxyType::Http));
        assert_eq!("socks5h".parse::<ProxyType>(), Ok(ProxyType::Socks5));
        assert_eq!("socks4a".parse::<ProxyType>(), Ok(ProxyType::Socks4));
        assert!("ftp".parse::<ProxyType>().is_err());
    }

    #[test]
    fn test_transport_scheme() {
        assert_eq!(ProxyType::Https.transport_scheme(), "http");
        assert_eq!(ProxyType::Socks5.transport_scheme(), "socks5");
    }

    #[test]
    fn test_fill_geography_only_fills_gaps() {
        let mut v = VerifiedProxy::new(
            record().with_geography(Some("US"), None),
            ProxyType::Http,
            120,
        );
        v.fill_geography(Some("CA"), Some("Toronto"));
        assert_eq!(v.record.country, "US");
        assert_eq!(v.record.city, UNKNOWN);
        assert_eq!(v.record.location(), "US");

        v.fill_geography(Some("us"), Some("Denver"));
        assert_eq!(v.record.city, "Denver");
        assert_eq!(v.record.location(), "Denver, US");
    }

    #[test]
    fn test_fill_geography_takes_country_and_city_together() {
        let mut r = record();
        assert!(r.fill_geography(Some("DE"), Some("Berlin")));
        assert_eq!(r.location(), "Berlin, DE");
        assert!(!r.fill_geography(Some("FR"), Some("Paris")));
        assert_eq!(r.location(), "Berlin, DE");
    }

    #[test]
    fn test_city_without_country_only_fills_unplaced_record() {
        let mut r = record();
        assert!(r.fill_geography(None, Some("Oslo")));
        assert_eq!(r.city, "Oslo");

        let mut placed = record().with_geography(Some("US"), None);
        assert!(!placed.fill_geography(None, Some("Oslo")));
        assert_eq!(placed.city, UNKNOWN);
    }

    #[test]
    fn test_probe_outcome() {
        assert!(ProbeOutcome::Working { latency_ms: 5 }.is_working());
        assert!(!ProbeOutcome::Timeout.is_working());
        assert!(!ProbeOutcome::Failed("refused".to_string()).is_working());
    }
}
