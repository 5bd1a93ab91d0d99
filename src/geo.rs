//! Geographic lookup of source addresses
//!
//! A thin seam over a local MaxMind database. Private and loopback
//! addresses resolve to a fixed internal-network location instead of
//! being queried; lookups for everything else go through a small cache.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;

use crate::utils::env_var_or_else;

/// Addresses the cache will hold
const CACHE_CAPACITY: u64 = 10_000;

/// Where internal traffic is pinned to
const INTERNAL_COUNTRY: &str = "US";
const INTERNAL_SUBDIVISION: &str = "NJ";

/// A resolved location
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Location {
    /// ISO 3166-1 alpha-2 country code, e.g. "US"
    pub country_code: Option<String>,

    /// Subdivision code within the country, e.g. "NJ"
    pub subdivision_code: Option<String>,
}

/// Geographic lookup seam
#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Resolve an address, best effort
    async fn locate(&self, ip: IpAddr) -> Location;
}

/// Locator used when no database is configured
pub struct UnknownLocator;

#[async_trait]
impl GeoLocator for UnknownLocator {
    async fn locate(&self, _ip: IpAddr) -> Location {
        Location::default()
    }
}

/// Locator backed by a local MaxMind city database
pub struct MaxMindLocator {
    /// The memory-loaded database
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindLocator {
    /// Load the database from a file path
    pub fn new(path: &str) -> Result<Self, maxminddb::MaxMindDbError> {
        let reader = maxminddb::Reader::open_readfile(path)?;

        Ok(Self { reader })
    }
}

#[async_trait]
impl GeoLocator for MaxMindLocator {
    async fn locate(&self, ip: IpAddr) -> Location {
        let Ok(result) = self.reader.lookup(ip) else {
            return Location::default();
        };

        let Ok(Some(city)) = result.decode::<maxminddb::geoip2::City>() else {
            return Location::default();
        };

        Location {
            country_code: city.country.iso_code.map(String::from),
            subdivision_code: city
                .subdivisions
                .first()
                .and_then(|subdivision| subdivision.iso_code)
                .map(String::from),
        }
    }
}

/// Caching wrapper around any locator
pub struct CachedLocator {
    /// The locator doing the actual work
    inner: Arc<dyn GeoLocator>,

    /// Resolved locations by address
    cache: Cache<IpAddr, Location>,
}

impl CachedLocator {
    /// Wrap a locator
    pub fn new(inner: Arc<dyn GeoLocator>) -> Self {
        Self {
            inner,
            cache: Cache::new(CACHE_CAPACITY),
        }
    }
}

#[async_trait]
impl GeoLocator for CachedLocator {
    async fn locate(&self, ip: IpAddr) -> Location {
        let inner = Arc::clone(&self.inner);

        self.cache
            .get_with(ip, async move { inner.locate(ip).await })
            .await
    }
}

/// Is this an address the public internet never sees?
pub fn is_internal(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            // fc00::/7 (ULA), fe80::/10 (link-local) and ::1
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Resolve an address, special-casing internal ranges
pub async fn resolve(locator: &dyn GeoLocator, ip: IpAddr) -> Location {
    if is_internal(&ip) {
        return Location {
            country_code: Some(INTERNAL_COUNTRY.to_string()),
            subdivision_code: Some(INTERNAL_SUBDIVISION.to_string()),
        };
    }

    locator.locate(ip).await
}

/// Setup the locator from the environment
///
/// Uses the MaxMind database at `GEOIP_DB_PATH` when it loads, otherwise
/// every public address resolves to an unknown location.
pub fn setup() -> Arc<dyn GeoLocator> {
    let path = env_var_or_else("GEOIP_DB_PATH", String::new);

    if path.is_empty() {
        tracing::info!("`GEOIP_DB_PATH` not set, visit locations will be unknown");

        return Arc::new(UnknownLocator);
    }

    match MaxMindLocator::new(&path) {
        Ok(locator) => {
            tracing::info!("Using MaxMind database at {path}");

            Arc::new(CachedLocator::new(Arc::new(locator)))
        }
        Err(err) => {
            tracing::warn!("Could not load MaxMind database at {path}: {err}");

            Arc::new(UnknownLocator)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::net::Ipv6Addr;

    use super::*;

    #[test]
    fn test_is_internal() {
        assert!(is_internal(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(is_internal(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(is_internal(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
        assert!(is_internal(&IpAddr::V6(Ipv6Addr::LOCALHOST)));

        assert!(!is_internal(&IpAddr::V4(Ipv4Addr::new(128, 6, 4, 2))));
        assert!(!is_internal(&IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
    }

    #[tokio::test]
    async fn test_resolve_pins_internal_addresses() {
        let location = resolve(&UnknownLocator, IpAddr::V4(Ipv4Addr::LOCALHOST)).await;
        assert_eq!(location.country_code.as_deref(), Some(INTERNAL_COUNTRY));

        let location = resolve(&UnknownLocator, IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))).await;
        assert_eq!(location, Location::default());
    }
}
