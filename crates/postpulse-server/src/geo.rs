use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use axum::http::HeaderMap;
use maxminddb::{geoip2, Reader};
use tracing::{info, warn};

use postpulse_core::event::Geo;

/// MaxMind City database, loaded once at startup.
pub struct GeoLookup {
    reader: Reader<Vec<u8>>,
}

impl GeoLookup {
    /// Open the database at `path`.
    ///
    /// A missing or unreadable file is non-fatal: heartbeats are then stored
    /// with whatever geo the client sent, or none.
    pub fn open(path: &str) -> Option<Self> {
        if !Path::new(path).exists() {
            warn!(
                geoip_path = %path,
                "GeoIP database not found. Heartbeats without client geo keep NULL location \
                 fields. Set POSTPULSE_GEOIP_PATH to a MaxMind City database to enable lookup."
            );
            return None;
        }
        match Reader::open_readfile(path) {
            Ok(reader) => {
                info!(geoip_path = %path, "GeoIP database loaded");
                Some(Self { reader })
            }
            Err(e) => {
                warn!(geoip_path = %path, error = %e, "GeoIP database unreadable");
                None
            }
        }
    }

    /// City, ISO country code and coordinates for `ip`, if the database knows it.
    pub fn lookup(&self, ip: &str) -> Option<Geo> {
        let ip_addr = IpAddr::from_str(ip).ok()?;
        let record: geoip2::City = self.reader.lookup(ip_addr).ok()?;

        let city = record
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());
        let country = record
            .country
            .as_ref()
            .and_then(|c| c.iso_code)
            .map(|s| s.to_string());
        let (latitude, longitude) = record
            .location
            .as_ref()
            .map(|l| (l.latitude, l.longitude))
            .unwrap_or((None, None));

        let geo = Geo {
            city,
            country,
            latitude,
            longitude,
        };
        (!geo.is_empty()).then_some(geo)
    }
}

/// First `X-Forwarded-For` entry; the site runs behind a reverse proxy.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
