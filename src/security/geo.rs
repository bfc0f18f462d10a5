//! ASN / City / Country enrichment from offline GeoLite2 databases.
//!
//! Three independent read-only readers are opened once at startup and shared
//! across requests. A miss in one database leaves that part of the
//! [`Enrichment`] empty; a lookup never fails as a whole.

use maxminddb::{MaxMindDBError, Reader};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::GeoError;

/// Localized names keyed by language code.
pub type Names = BTreeMap<String, String>;

/// GeoLite2-ASN record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AsnRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autonomous_system_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autonomous_system_organization: Option<String>,
}

/// A named place (city, continent, subdivision).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Place {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub names: Option<Names>,
}

/// Coordinates and zone of a city record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// GeoLite2-City record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CityRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<Place>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continent: Option<Place>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<Place>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdivisions: Option<Vec<Place>>,
}

/// GeoLite2-Country record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CountryRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continent: Option<Place>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<Place>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_country: Option<Place>,
}

/// Enrichment for one IP. Each part is absent when its database lacks the IP.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub asn: Option<AsnRecord>,
    pub city: Option<CityRecord>,
    pub country: Option<CountryRecord>,
}

impl Enrichment {
    /// Serialized, space-joined, uppercased text used as matcher and
    /// classifier input. Absent parts render as `NULL`.
    pub fn subject(&self) -> String {
        format!(
            "{} {} {}",
            to_json(&self.asn),
            to_json(&self.city),
            to_json(&self.country)
        )
        .to_uppercase()
    }

    pub fn is_empty(&self) -> bool {
        self.asn.is_none() && self.city.is_none() && self.country.is_none()
    }
}

fn to_json<T: Serialize>(part: &Option<T>) -> String {
    serde_json::to_string(part).unwrap_or_else(|_| "null".to_string())
}

/// Source of enrichment data for an IP.
///
/// `ip` is the raw client key and may not parse as an address (for example
/// the `unknown` sentinel); implementations return an empty enrichment then.
pub trait Enricher: Send + Sync {
    fn lookup(&self, ip: &str) -> Enrichment;
}

/// MaxMind-backed enricher. Any of the three databases may be omitted.
pub struct GeoEnricher {
    asn: Option<Reader<Vec<u8>>>,
    city: Option<Reader<Vec<u8>>>,
    country: Option<Reader<Vec<u8>>>,
}

impl GeoEnricher {
    /// Open the configured databases read-only.
    pub fn open(
        asn: Option<&Path>,
        city: Option<&Path>,
        country: Option<&Path>,
    ) -> Result<Self, GeoError> {
        let enricher = Self {
            asn: asn.map(|p| open_reader("ASN", p)).transpose()?,
            city: city.map(|p| open_reader("City", p)).transpose()?,
            country: country.map(|p| open_reader("Country", p)).transpose()?,
        };
        info!(
            asn = enricher.asn.is_some(),
            city = enricher.city.is_some(),
            country = enricher.country.is_some(),
            "geo databases opened"
        );
        Ok(enricher)
    }

    /// An enricher with no databases; every lookup is empty.
    pub fn empty() -> Self {
        Self {
            asn: None,
            city: None,
            country: None,
        }
    }
}

impl Enricher for GeoEnricher {
    fn lookup(&self, ip: &str) -> Enrichment {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            debug!(ip = %ip, "client key is not an IP address; enrichment empty");
            return Enrichment::default();
        };
        Enrichment {
            asn: lookup_in(self.asn.as_ref(), "ASN", addr),
            city: lookup_in(self.city.as_ref(), "City", addr),
            country: lookup_in(self.country.as_ref(), "Country", addr),
        }
    }
}

fn open_reader(kind: &'static str, path: &Path) -> Result<Reader<Vec<u8>>, GeoError> {
    Reader::open_readfile(path).map_err(|e| GeoError {
        kind,
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn lookup_in<T: DeserializeOwned>(
    reader: Option<&Reader<Vec<u8>>>,
    kind: &'static str,
    addr: IpAddr,
) -> Option<T> {
    let reader = reader?;
    match reader.lookup::<T>(addr) {
        Ok(record) => Some(record),
        Err(MaxMindDBError::AddressNotFoundError(_)) => {
            debug!(ip = %addr, database = kind, "address not in database");
            None
        }
        Err(e) => {
            warn!(ip = %addr, database = kind, error = %e, "geo lookup failed");
            None
        }
    }
}
