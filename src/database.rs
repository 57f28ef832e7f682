//! Database image and IP lookups
//!
//! A `Database` owns one immutable image of an MMDB file, either
//! memory-mapped or held in memory (gzip input, tests). It is `Send + Sync`
//! and meant to be shared behind an `Arc` by every request handler.

use crate::data_section::{DataDecoder, DataValue};
use crate::error::{DecodeError, OpenError};
use crate::mmdb::{
    find_metadata_marker, IpVersion, LookupResult, Metadata, MmdbHeader, SearchTree,
    METADATA_MARKER,
};
use flate2::read::GzDecoder;
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

/// Storage for database data - either owned or memory-mapped
enum DatabaseStorage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl DatabaseStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            DatabaseStorage::Owned(v) => v.as_slice(),
            DatabaseStorage::Mmap(m) => &m[..],
        }
    }
}

/// A decoded record together with the prefix length that matched
#[derive(Debug, Clone, PartialEq)]
pub struct IpRecord {
    /// The record associated with the matched network
    pub data: DataValue,
    /// Depth of the matching tree record, as libmaxminddb reports it
    ///
    /// This is the inserted network's prefix length unless a more
    /// specific network split it, in which case it is the depth at which
    /// the address leaves that network's path. IPv4-relative for IPv4
    /// lookups.
    pub prefix_len: u8,
}

/// Read-only MMDB database
///
/// # Examples
///
/// ```no_run
/// use geoipd::Database;
///
/// let db = Database::open("GeoIP2-City.mmdb")?;
/// if let Some(record) = db.lookup("8.8.8.8".parse()?)? {
///     println!("{:?} (/{})", record.data, record.prefix_len);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Database {
    storage: DatabaseStorage,
    header: MmdbHeader,
    metadata: Metadata,
    /// Record where IPv4 lookups start; 0 for IPv4 trees
    ipv4_start: u32,
}

impl Database {
    /// Open a database file
    ///
    /// Plain files are memory-mapped. Files ending in `.gz` are decompressed
    /// into memory once.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let io_err = |source| OpenError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_err)?;

        let is_gzip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gz"));

        let storage = if is_gzip {
            let mut data = Vec::new();
            GzDecoder::new(file).read_to_end(&mut data).map_err(io_err)?;
            DatabaseStorage::Owned(data)
        } else {
            // SAFETY: the image is treated as read-only; replacing the file
            // underneath a running process is not supported.
            let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;
            DatabaseStorage::Mmap(mmap)
        };

        let db = Self::from_storage(storage)?;
        debug!(
            path = %path.display(),
            bytes = db.size(),
            gzip = is_gzip,
            "opened database"
        );
        Ok(db)
    }

    /// Create a database from an in-memory image
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, OpenError> {
        Self::from_storage(DatabaseStorage::Owned(data))
    }

    fn from_storage(storage: DatabaseStorage) -> Result<Self, OpenError> {
        let data = storage.as_slice();

        let marker = find_metadata_marker(data)?;
        let metadata = Metadata::decode(&data[marker + METADATA_MARKER.len()..])?;
        let header = MmdbHeader::new(&metadata, marker)?;

        let ipv4_start = match header.ip_version {
            IpVersion::V4 => 0,
            IpVersion::V6 => SearchTree::new(data, &header)
                .find_ipv4_start()
                .map_err(|e| OpenError::Corrupt(e.to_string()))?,
        };

        Ok(Self {
            storage,
            header,
            metadata,
            ipv4_start,
        })
    }

    /// Find the data section offset for the longest prefix containing `addr`
    ///
    /// Returns `Ok(None)` when no prefix matches.
    pub fn lookup_ip(&self, addr: IpAddr) -> Result<Option<LookupResult>, DecodeError> {
        SearchTree::new(self.storage.as_slice(), &self.header)
            .with_ipv4_start(self.ipv4_start)
            .lookup(addr)
    }

    /// Decode the record at a data section offset
    pub fn decode(&self, offset: u32) -> Result<DataValue, DecodeError> {
        DataDecoder::new(self.data_section()).decode(offset)
    }

    /// Look up an address and decode its record
    pub fn lookup(&self, addr: IpAddr) -> Result<Option<IpRecord>, DecodeError> {
        match self.lookup_ip(addr)? {
            Some(hit) => Ok(Some(IpRecord {
                data: self.decode(hit.data_offset)?,
                prefix_len: hit.prefix_len,
            })),
            None => Ok(None),
        }
    }

    /// Decoded database metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Layout of the image
    pub fn header(&self) -> &MmdbHeader {
        &self.header
    }

    /// Size of the image in bytes
    pub fn size(&self) -> usize {
        self.storage.as_slice().len()
    }

    /// Whether the image is memory-mapped rather than held in memory
    pub fn is_mmap(&self) -> bool {
        matches!(self.storage, DatabaseStorage::Mmap(_))
    }

    fn data_section(&self) -> &[u8] {
        &self.storage.as_slice()[self.header.data_section_start..self.header.data_section_end]
    }
}
