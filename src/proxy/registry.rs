//! Deduplicated `host:port` registry of candidate proxies

use crate::proxy::models::RawProxyRecord;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// What happened when a record was offered to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First sighting of the key
    Inserted,
    /// Existing record gained protocols or geography
    Merged,
    /// Existing record already knew everything offered
    Unchanged,
}

/// Mapping of `host:port` to exactly one record
///
/// Mutation needs `&mut self`, so ingestion is single-writer by construction;
/// the verifier only ever sees a shared reference.
#[derive(Debug, Clone, Default)]
pub struct ProxyRegistry {
    records: HashMap<String, RawProxyRecord>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record or merge it into the existing one.
    ///
    /// Protocols are unioned. Geography only fills fields that are still
    /// "Unknown", and a city is only taken alongside a matching country.
    /// The first source to report a key stays its origin.
    pub fn merge(&mut self, record: RawProxyRecord) -> MergeOutcome {
        let key = record.key();
        let Some(existing) = self.records.get_mut(&key) else {
            self.records.insert(key, record);
            return MergeOutcome::Inserted;
        };

        let mut changed = false;
        for protocol in record.protocols {
            changed |= existing.protocols.insert(protocol);
        }
        changed |= existing.fill_geography(Some(&record.country), Some(&record.city));

        if changed {
            MergeOutcome::Merged
        } else {
            MergeOutcome::Unchanged
        }
    }

    pub fn get(&self, key: &str) -> Option<&RawProxyRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = &RawProxyRecord> {
        self.records.values()
    }

    /// Records ordered by numeric IPv4 address then port; hosts that are
    /// not IPv4 literals sort after them by text
    pub fn sorted_records(&self) -> Vec<&RawProxyRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| compare_hosts(a, b));
        records
    }
}

fn compare_hosts(a: &RawProxyRecord, b: &RawProxyRecord) -> Ordering {
    let ip_a = a.host.parse::<Ipv4Addr>().ok();
    let ip_b = b.host.parse::<Ipv4Addr>().ok();
    match (ip_a, ip_b) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.port.cmp(&b.port)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.host.cmp(&b.host).then(a.port.cmp(&b.port)),
    }
}
