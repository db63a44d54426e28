//! Payload normalizer turning raw source listings into registry records
//!
//! Two payload classes are understood:
//! - structured JSON: a top-level array of records, or an object wrapping
//!   the array under `data`
//! - line-oriented text: `scheme://host:port` or `host:port`, one per line
//!
//! A JSON payload that fails to parse is retried as text before the source
//! is given up on.

use crate::proxy::models::{is_known, ProxyType, RawProxyRecord};
use crate::proxy::registry::{MergeOutcome, ProxyRegistry};
use crate::proxy::sources::{FormatHint, SourceDescriptor};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// `scheme://[user:pass@]host:port[/]`
static URL_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]+)://(?:[^@/\s]*@)?([^:/@\s]+):(\d{1,5})/?$")
        .expect("Invalid proxy URL regex")
});

/// Detected shape of a source payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<'a> {
    /// Records taken from a JSON array, top-level or wrapped
    Records(Vec<Value>),
    /// Text to be read line by line
    Lines(&'a str),
}

impl Payload<'_> {
    pub fn hint(&self) -> FormatHint {
        match self {
            Payload::Records(_) => FormatHint::Json,
            Payload::Lines(_) => FormatHint::Lines,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StructuredPayload {
    List(Vec<Value>),
    Wrapped {
        #[serde(alias = "proxies")]
        data: Vec<Value>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortField {
    Number(u64),
    Text(String),
}

impl PortField {
    fn port(&self) -> Option<u16> {
        match self {
            PortField::Number(n) => valid_port(*n),
            PortField::Text(s) => parse_port(s.trim()),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GeoFields {
    country: Option<String>,
    city: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonRecord {
    #[serde(alias = "host")]
    ip: Option<String>,
    port: Option<PortField>,
    country: Option<String>,
    city: Option<String>,
    geolocation: Option<GeoFields>,
    protocols: Option<Vec<String>>,
    protocol: Option<String>,
}

/// Per-source ingestion counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Keys seen for the first time
    pub inserted: usize,
    /// Existing keys that gained protocols or geography
    pub merged: usize,
    /// Existing keys that learned nothing new
    pub duplicates: usize,
    /// Lines or records that failed host/port validation
    pub rejected: usize,
    /// The payload looked like JSON but had to be read as text
    pub json_fallback: bool,
}

impl NormalizeStats {
    /// Entries that passed validation
    pub fn accepted(&self) -> usize {
        self.inserted + self.merged + self.duplicates
    }

    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Merged => self.merged += 1,
            MergeOutcome::Unchanged => self.duplicates += 1,
        }
    }
}

/// Proxy parser for turning source payloads into records
pub struct ProxyParser;

impl ProxyParser {
    /// Classify a payload. Text starting with `[` or `{` is tried as JSON
    /// first; anything that does not decode into a record array is text.
    pub fn classify(content: &str) -> Payload<'_> {
        let trimmed = content.trim();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            match serde_json::from_str::<StructuredPayload>(trimmed) {
                Ok(StructuredPayload::List(records))
                | Ok(StructuredPayload::Wrapped { data: records }) => {
                    return Payload::Records(records)
                }
                Err(e) => debug!("Payload is not a JSON record list ({}), reading as text", e),
            }
        }
        Payload::Lines(content)
    }

    /// Parse a payload from `source` and merge every valid entry into
    /// `registry`
    pub fn normalize(
        content: &str,
        source: &SourceDescriptor,
        registry: &mut ProxyRegistry,
    ) -> NormalizeStats {
        let mut stats = NormalizeStats::default();
        let payload = Self::classify(content);

        if payload.hint() != source.format_hint {
            debug!(
                "Source {} announced {:?} but returned {:?}",
                source.url,
                source.format_hint,
                payload.hint()
            );
        }
        let trimmed = content.trim_start();
        stats.json_fallback = matches!(payload, Payload::Lines(_))
            && (trimmed.starts_with('[') || trimmed.starts_with('{'));

        match payload {
            Payload::Records(records) => {
                for value in records {
                    match Self::parse_record(value, source) {
                        Some(record) => stats.record(registry.merge(record)),
                        None => stats.rejected += 1,
                    }
                }
            }
            Payload::Lines(text) => {
                for line in text.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    match Self::parse_line(line, source) {
                        Some(record) => stats.record(registry.merge(record)),
                        None => stats.rejected += 1,
                    }
                }
            }
        }

        if stats.json_fallback && stats.accepted() == 0 {
            warn!("Source {} returned unreadable JSON, no proxies taken", source.url);
        }

        stats
    }

    /// Parse one structured record
    pub fn parse_record(value: Value, source: &SourceDescriptor) -> Option<RawProxyRecord> {
        let record: JsonRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping malformed record from {}: {}", source.url, e);
                return None;
            }
        };

        let host = record.ip.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        let port = record.port.as_ref()?.port()?;

        // Top-level geography wins over the nested block only when it holds
        // a real value; null, empty and "Unknown" fall through
        let geo = record.geolocation.unwrap_or_default();
        let country = known(record.country.as_deref()).or(known(geo.country.as_deref()));
        let city = known(record.city.as_deref()).or(known(geo.city.as_deref()));

        let mut protocols: BTreeSet<ProxyType> = match record.protocol.as_deref() {
            Some(single) if !single.trim().is_empty() => {
                single.parse::<ProxyType>().into_iter().collect()
            }
            _ => record
                .protocols
                .unwrap_or_default()
                .iter()
                .filter_map(|p| p.parse().ok())
                .collect(),
        };
        if protocols.is_empty() {
            protocols.extend(source.fallback_protocols());
        }

        Some(
            RawProxyRecord::new(host.to_string(), port, source.name())
                .with_protocols(protocols)
                .with_geography(country, city),
        )
    }

    /// Parse one text line
    ///
    /// Supports formats:
    /// - scheme://IP:PORT (scheme is the protocol)
    /// - scheme://USER:PASS@IP:PORT (credentials are dropped)
    /// - IP:PORT, optionally followed by whitespace and anything else
    pub fn parse_line(line: &str, source: &SourceDescriptor) -> Option<RawProxyRecord> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.contains("://") {
            let caps = URL_LINE_REGEX.captures(line)?;
            let protocol: ProxyType = caps[1].parse().ok()?;
            let port = parse_port(&caps[3])?;
            return Some(
                RawProxyRecord::new(caps[2].to_string(), port, source.name())
                    .with_protocols([protocol]),
            );
        }

        let token = line.split_whitespace().next()?;
        let mut parts = token.split(':');
        let host = parts.next().filter(|h| !h.is_empty())?;
        let port = parse_port(parts.next()?)?;

        Some(
            RawProxyRecord::new(host.to_string(), port, source.name())
                .with_protocols(source.fallback_protocols()),
        )
    }
}

fn known(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| is_known(v))
}

fn valid_port(port: u64) -> Option<u16> {
    if (1..=65535).contains(&port) {
        u16::try_from(port).ok()
    } else {
        None
    }
}

fn parse_port(text: &str) -> Option<u16> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    valid_port(text.parse().ok()?)
}
