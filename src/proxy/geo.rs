//! Optional MMDB lookup for proxies whose sources gave no geography
//!
//! Sources stay authoritative: a lookup only fills fields still set to
//! "Unknown" after normalization.

use crate::proxy::models::VerifiedProxy;
use crate::Result;
use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Country and city as found in the city database
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 code, the same form sources report
    pub country_code: Option<String>,
    pub city_name: Option<String>,
}

impl GeoLocation {
    pub fn is_empty(&self) -> bool {
        self.country_code.is_none() && self.city_name.is_none()
    }
}

/// Shared handle to an opened GeoLite2/GeoIP2 city database
#[derive(Clone)]
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// City record for an address. Addresses missing from the database
    /// give an empty location rather than an error.
    pub fn lookup_ip(&self, ip: IpAddr) -> Result<GeoLocation> {
        let city: Option<geoip2::City> = self.reader.lookup(ip)?.decode()?;

        Ok(city
            .map(|city| GeoLocation {
                country_code: city.country.iso_code.map(String::from),
                city_name: city.city.names.english.map(String::from),
            })
            .unwrap_or_default())
    }

    /// Fill unknown geography on a verified proxy. Hostnames that are not
    /// IP literals are left alone.
    pub fn annotate(&self, proxy: &mut VerifiedProxy) {
        let Ok(ip) = proxy.record.host.parse::<IpAddr>() else {
            return;
        };

        match self.lookup_ip(ip) {
            Ok(location) if !location.is_empty() => proxy.fill_geography(
                location.country_code.as_deref(),
                location.city_name.as_deref(),
            ),
            Ok(_) => {}
            Err(e) => debug!("Geo lookup failed for {}: {}", ip, e),
        }
    }
}
