//! The lookup service: three name queries over a shared database
//!
//! Every call parses the address, walks the tree, decodes the record and
//! projects it. Calls are independent; the service holds nothing but a
//! shared reference to the immutable database.

use crate::database::Database;
use crate::error::QueryError;
use crate::geo::{GeoRecord, DEFAULT_LANGUAGE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error};

/// Input of every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRequest {
    /// Textual IPv4 or IPv6 address
    pub ip: String,
}

impl IpRequest {
    /// Wrap an address string
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }
}

/// Output of every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameResponse {
    /// Resolved name
    pub name: String,
}

/// The operations the service exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// ISO country code
    QueryCountry,
    /// City name
    QueryCity,
    /// First subdivision name
    QuerySubdivision,
}

impl Method {
    /// All operations, in declaration order
    pub const ALL: [Method; 3] = [Method::QueryCountry, Method::QueryCity, Method::QuerySubdivision];
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::QueryCountry => "QueryCountry",
            Method::QueryCity => "QueryCity",
            Method::QuerySubdivision => "QuerySubdivision",
        };
        f.write_str(name)
    }
}

/// Geolocation lookup service
#[derive(Clone)]
pub struct GeoIpService {
    db: Arc<Database>,
    language: String,
}

impl GeoIpService {
    /// Create a service reading English names
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Read localized names in another language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// The underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Language used for localized names
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Resolve an address to its projected record
    pub fn lookup(&self, ip: &str) -> Result<GeoRecord, QueryError> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| QueryError::InvalidInput(ip.to_string()))?;

        match self.db.lookup(addr) {
            Ok(Some(record)) => Ok(GeoRecord::project(&record.data, &self.language)),
            Ok(None) => {
                debug!(%addr, "no network contains address");
                Err(QueryError::NotFound)
            }
            Err(e) => {
                error!(%addr, error = %e, "failed to decode record");
                Err(QueryError::Decode(e))
            }
        }
    }

    /// ISO country code of the network containing `ip`
    pub fn query_country(&self, request: &IpRequest) -> Result<NameResponse, QueryError> {
        let geo = self.lookup(&request.ip)?;
        respond(geo.country_iso_code)
    }

    /// City name of the network containing `ip`
    pub fn query_city(&self, request: &IpRequest) -> Result<NameResponse, QueryError> {
        let geo = self.lookup(&request.ip)?;
        respond(geo.city_name)
    }

    /// First subdivision name of the network containing `ip`
    ///
    /// Fails with `NoSubdivisions` when the record lists none.
    pub fn query_subdivision(&self, request: &IpRequest) -> Result<NameResponse, QueryError> {
        let geo = self.lookup(&request.ip)?;
        if !geo.has_subdivisions {
            return Err(QueryError::NoSubdivisions);
        }
        respond(geo.subdivision_name)
    }

    /// Dispatch a query by method
    pub fn call(&self, method: Method, request: &IpRequest) -> Result<NameResponse, QueryError> {
        match method {
            Method::QueryCountry => self.query_country(request),
            Method::QueryCity => self.query_city(request),
            Method::QuerySubdivision => self.query_subdivision(request),
        }
    }
}

fn respond(name: Option<String>) -> Result<NameResponse, QueryError> {
    name.map(|name| NameResponse { name })
        .ok_or(QueryError::NotFound)
}
