//! geoipd - IP Geolocation Lookup Service
//!
//! geoipd resolves IP addresses to coarse geographic names (ISO country
//! code, city name, first-level subdivision name) using a local database in
//! the MaxMind DB (MMDB) binary format, and serves those lookups over TCP.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use geoipd::{Database, GeoIpService, IpRequest};
//! use std::sync::Arc;
//!
//! let db = Database::open("GeoIP2-City.mmdb")?;
//! let service = GeoIpService::new(Arc::new(db));
//!
//! let country = service.query_country(&IpRequest::new("81.2.69.142"))?;
//! println!("{}", country.name);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  MMDB File                           │
//! ├──────────────────────────────────────┤
//! │  1. Search Tree (binary trie)        │
//! │  2. 16-byte separator                │
//! │  3. Data Section (typed records)     │
//! │  4. Marker + Metadata                │
//! └──────────────────────────────────────┘
//!          ↓ mmap() or gunzip
//! ┌──────────────────────────────────────┐
//! │  Database (immutable, Send + Sync)   │
//! └──────────────────────────────────────┘
//!          ↓ Arc
//! ┌──────────────────────────────────────┐
//! │  GeoIpService → Server (tokio/TCP)   │
//! └──────────────────────────────────────┘
//! ```
//!
//! A lookup walks the tree with the address bits to a data offset, decodes
//! the record there ([`DataValue`]), and projects it into a [`GeoRecord`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Async client for a running server
pub mod client;
/// Service configuration and database path resolution
pub mod config;
/// Data section decoding
pub mod data_section;
/// Database image and IP lookups
pub mod database;
/// Error types
pub mod error;
pub mod geo;
pub mod logging;
/// MMDB format (metadata and search tree)
pub mod mmdb;
pub mod protocol;
pub mod server;
pub mod service;

// Re-exports for Rust consumers

pub use crate::data_section::DataValue;
pub use crate::database::{Database, IpRecord};
pub use crate::error::{DecodeError, OpenError, QueryError};
pub use crate::geo::GeoRecord;
pub use crate::service::{GeoIpService, IpRequest, Method, NameResponse};

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
