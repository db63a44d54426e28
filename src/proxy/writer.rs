//! Report writers for verified proxies and the raw registry

use crate::error::OutputError;
use crate::proxy::models::{ProxyType, RawProxyRecord, VerifiedProxy};
use crate::proxy::registry::ProxyRegistry;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Run-level figures printed in the report header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportHeader {
    pub generated_at: DateTime<Local>,
    /// Candidates that were probed
    pub checked: usize,
}

impl ReportHeader {
    pub fn now(checked: usize) -> Self {
        Self {
            generated_at: Local::now(),
            checked,
        }
    }
}

#[derive(Serialize)]
struct RegistryEntry<'a> {
    proxy: String,
    location: String,
    country: &'a str,
    city: &'a str,
    protocols: Vec<ProxyType>,
    source: &'a str,
}

impl<'a> From<&'a RawProxyRecord> for RegistryEntry<'a> {
    fn from(record: &'a RawProxyRecord) -> Self {
        Self {
            proxy: record.key(),
            location: record.location(),
            country: &record.country,
            city: &record.city,
            protocols: record.protocols.iter().copied().collect(),
            source: &record.origin_source,
        }
    }
}

#[derive(Serialize)]
struct VerifiedEntry<'a> {
    protocol: ProxyType,
    latency_ms: u64,
    #[serde(flatten)]
    details: RegistryEntry<'a>,
}

/// Writers for the run's outputs
pub struct ResultWriter;

impl ResultWriter {
    /// Fixed-width text report. `verified` is written in the order given,
    /// which is fastest first when it comes from the checker.
    pub fn write_text<W: Write>(
        out: &mut W,
        header: &ReportHeader,
        verified: &[VerifiedProxy],
    ) -> Result<(), OutputError> {
        writeln!(
            out,
            "# Proxy List - Updated: {}",
            header.generated_at.format(TIMESTAMP_FORMAT)
        )?;
        writeln!(
            out,
            "# Live proxies: {} of {} checked",
            verified.len(),
            header.checked
        )?;
        writeln!(out, "# Sorted by latency, fastest first")?;
        writeln!(out)?;
        writeln!(
            out,
            "{:<22} {:<8} {:<30} {:>10}",
            "ADDRESS", "PROTOCOL", "LOCATION", "LATENCY"
        )?;

        for proxy in verified {
            writeln!(
                out,
                "{:<22} {:<8} {:<30} {:>7} ms",
                proxy.address(),
                proxy.verified_protocol.to_string(),
                proxy.record.location(),
                proxy.latency_ms
            )?;
        }

        out.flush()?;
        Ok(())
    }

    /// JSON array of verified proxies with their latency and geography
    pub fn write_json<W: Write>(
        out: &mut W,
        verified: &[VerifiedProxy],
    ) -> Result<(), OutputError> {
        let entries: Vec<VerifiedEntry<'_>> = verified
            .iter()
            .map(|proxy| VerifiedEntry {
                protocol: proxy.verified_protocol,
                latency_ms: proxy.latency_ms,
                details: RegistryEntry::from(&proxy.record),
            })
            .collect();

        serde_json::to_writer_pretty(&mut *out, &entries)?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    /// Unverified registry dump, ordered by address
    pub fn write_registry_json<W: Write>(
        out: &mut W,
        registry: &ProxyRegistry,
    ) -> Result<(), OutputError> {
        let entries: Vec<RegistryEntry<'_>> = registry
            .sorted_records()
            .into_iter()
            .map(RegistryEntry::from)
            .collect();

        serde_json::to_writer_pretty(&mut *out, &entries)?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    pub fn save_text<P: AsRef<Path>>(
        path: P,
        header: &ReportHeader,
        verified: &[VerifiedProxy],
    ) -> Result<(), OutputError> {
        let mut out = BufWriter::new(File::create(path)?);
        Self::write_text(&mut out, header, verified)
    }

    pub fn save_json<P: AsRef<Path>>(
        path: P,
        verified: &[VerifiedProxy],
    ) -> Result<(), OutputError> {
        let mut out = BufWriter::new(File::create(path)?);
        Self::write_json(&mut out, verified)
    }

    pub fn save_registry_json<P: AsRef<Path>>(
        path: P,
        registry: &ProxyRegistry,
    ) -> Result<(), OutputError> {
        let mut out = BufWriter::new(File::create(path)?);
        Self::write_registry_json(&mut out, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn header(checked: usize) -> ReportHeader {
        ReportHeader {
            generated_at: Local.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap(),
            checked,
        }
    }

    fn verified(host: &str, latency_ms: u64) -> VerifiedProxy {
        let record = RawProxyRecord::new(host.to_string(), 8080, "api.example.com".to_string())
            .with_protocols([ProxyType::Http, ProxyType::Socks5])
            .with_geography(Some("DE"), Some("Berlin"));
        VerifiedProxy::new(record, ProxyType::Socks5, latency_ms)
    }

    #[test]
    fn test_empty_report_has_header() {
        let mut out = Vec::new();
        ResultWriter::write_text(&mut out, &header(0), &[]).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "# Proxy List - Updated: 2026-10-16 09:30:00");
        assert_eq!(lines[1], "# Live proxies: 0 of 0 checked");
        assert!(lines.last().unwrap().starts_with("ADDRESS"));
    }

    #[test]
    fn test_text_report_rows() {
        let mut out = Vec::new();
        let proxies = vec![verified("1.2.3.4", 42), verified("5.6.7.8", 380)];
        ResultWriter::write_text(&mut out, &header(10), &proxies).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("# Live proxies: 2 of 10 checked"));
        let rows: Vec<_> = text.lines().skip(5).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("1.2.3.4:8080"));
        assert!(rows[0].contains("socks5"));
        assert!(rows[0].contains("Berlin, DE"));
        assert!(rows[0].ends_with("42 ms"));
        assert!(rows[1].starts_with("5.6.7.8:8080"));
        // Columns line up
        assert_eq!(rows[0].len(), rows[1].len());
    }

    #[test]
    fn test_json_report() {
        let mut out = Vec::new();
        ResultWriter::write_json(&mut out, &[verified("1.2.3.4", 42)]).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();

        let entry = &value[0];
        assert_eq!(entry["proxy"], "1.2.3.4:8080");
        assert_eq!(entry["protocol"], "socks5");
        assert_eq!(entry["latency_ms"], 42);
        assert_eq!(entry["location"], "Berlin, DE");
        assert_eq!(entry["source"], "api.example.com");
        assert_eq!(entry["protocols"], serde_json::json!(["http", "socks5"]));
    }

    #[test]
    fn test_registry_dump_is_sorted() {
        let mut registry = ProxyRegistry::new();
        registry.merge(RawProxyRecord::new("10.0.0.2".to_string(), 80, "a".to_string()));
        registry.merge(RawProxyRecord::new("2.0.0.1".to_string(), 80, "b".to_string()));

        let mut out = Vec::new();
        ResultWriter::write_registry_json(&mut out, &registry).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value[0]["proxy"], "2.0.0.1:80");
        assert_eq!(value[1]["proxy"], "10.0.0.2:80");
        assert_eq!(value[1]["location"], "Unknown");
    }

    #[test]
    fn test_save_to_unwritable_path_fails() {
        let result = ResultWriter::save_text("/nonexistent/dir/proxies.txt", &header(0), &[]);
        assert!(matches!(result, Err(OutputError::Io(_))));
    }
}
