//! MMDB Binary Format Parsing
//!
//! Locates the metadata section, decodes it, and derives the layout of the
//! search tree and data section from it.
//!
//! Design:
//! - Find metadata marker (reverse slice search in the last 128 KiB, no allocation)
//! - Decode the metadata map once at open time
//! - Keep only the layout numbers needed for lookups in `MmdbHeader`

use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
use crate::data_section::{DataDecoder, DataValue};
use crate::error::OpenError;
use std::collections::HashMap;

/// Window at the end of the file searched for the metadata marker
const METADATA_SEARCH_SIZE: usize = 128 * 1024;

/// Only major version 2 of the binary format exists
const SUPPORTED_MAJOR_VERSION: u64 = 2;

/// Decoded database metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits
    pub record_size: RecordSize,
    /// IP version of the tree
    pub ip_version: IpVersion,
    /// Database type string, e.g. "GeoIP2-City"
    pub database_type: String,
    /// Locales that may appear in `names` maps
    pub languages: Vec<String>,
    /// Binary format major version
    pub binary_format_major_version: u16,
    /// Binary format minor version
    pub binary_format_minor_version: u16,
    /// Build time as seconds since the Unix epoch
    pub build_epoch: u64,
    /// Description keyed by language
    pub description: HashMap<String, String>,
}

impl Metadata {
    /// Decode metadata from the bytes following the marker
    pub fn decode(bytes: &[u8]) -> Result<Self, OpenError> {
        let value = DataDecoder::new(bytes)
            .decode(0)
            .map_err(|e| OpenError::InvalidMetadata(format!("Failed to decode metadata: {}", e)))?;
        Self::from_value(&value)
    }

    /// Extract metadata fields from a decoded map
    pub fn from_value(value: &DataValue) -> Result<Self, OpenError> {
        let map = value
            .as_map()
            .ok_or_else(|| OpenError::InvalidMetadata("Metadata is not a map".to_string()))?;

        let major = extract_uint(map, "binary_format_major_version")?;
        if major != SUPPORTED_MAJOR_VERSION {
            return Err(OpenError::UnsupportedVersion(major));
        }

        let node_count = extract_uint(map, "node_count")?;
        let node_count = u32::try_from(node_count).map_err(|_| {
            OpenError::InvalidMetadata(format!("node_count {} does not fit in 32 bits", node_count))
        })?;
        if node_count == 0 {
            return Err(OpenError::InvalidMetadata("node_count is zero".to_string()));
        }

        let record_size = RecordSize::from_bits(extract_uint(map, "record_size")?)?;

        let ip_version = match extract_uint(map, "ip_version")? {
            4 => IpVersion::V4,
            6 => IpVersion::V6,
            other => {
                return Err(OpenError::InvalidMetadata(format!(
                    "Invalid IP version: {}",
                    other
                )))
            }
        };

        let database_type = map
            .get("database_type")
            .and_then(DataValue::as_str)
            .unwrap_or_default()
            .to_string();

        let languages = map
            .get("languages")
            .and_then(DataValue::as_array)
            .map(|langs| {
                langs
                    .iter()
                    .filter_map(DataValue::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let description = map
            .get("description")
            .and_then(DataValue::as_map)
            .map(|desc| {
                desc.iter()
                    .filter_map(|(lang, text)| Some((lang.clone(), text.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Metadata {
            node_count,
            record_size,
            ip_version,
            database_type,
            languages,
            binary_format_major_version: major as u16,
            binary_format_minor_version: optional_uint(map, "binary_format_minor_version") as u16,
            build_epoch: optional_uint(map, "build_epoch"),
            description,
        })
    }
}

/// Layout of a database image
///
/// Offsets are absolute positions in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmdbHeader {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: RecordSize,
    /// IP version (4 or 6)
    pub ip_version: IpVersion,
    /// Size of the search tree in bytes
    pub tree_size: usize,
    /// First byte of the data section
    pub data_section_start: usize,
    /// One past the last byte of the data section (the metadata marker)
    pub data_section_end: usize,
}

impl MmdbHeader {
    /// Derive the layout from metadata and the position of the marker
    pub fn new(metadata: &Metadata, marker_offset: usize) -> Result<Self, OpenError> {
        let tree_size = (metadata.node_count as usize) * metadata.record_size.node_bytes();
        let data_section_start = tree_size + DATA_SECTION_SEPARATOR_SIZE;

        if data_section_start > marker_offset {
            return Err(OpenError::Truncated(format!(
                "search tree of {} nodes needs {} bytes but metadata starts at {}",
                metadata.node_count, data_section_start, marker_offset
            )));
        }

        Ok(MmdbHeader {
            node_count: metadata.node_count,
            record_size: metadata.record_size,
            ip_version: metadata.ip_version,
            tree_size,
            data_section_start,
            data_section_end: marker_offset,
        })
    }

    /// Length of the data section in bytes
    pub fn data_section_len(&self) -> usize {
        self.data_section_end - self.data_section_start
    }
}

/// Find the metadata marker in an MMDB file (zero allocation)
///
/// The marker appears somewhere in the last 128 KiB of the file and the
/// metadata follows it. If the marker occurs more than once, the LAST
/// occurrence wins, matching libmaxminddb.
pub fn find_metadata_marker(data: &[u8]) -> Result<usize, OpenError> {
    if data.len() < METADATA_MARKER.len() {
        return Err(OpenError::MetadataNotFound);
    }

    let search_start = data.len().saturating_sub(METADATA_SEARCH_SIZE);

    memchr::memmem::rfind(&data[search_start..], METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or(OpenError::MetadataNotFound)
}

fn extract_uint(map: &HashMap<String, DataValue>, key: &str) -> Result<u64, OpenError> {
    match map.get(key) {
        Some(value) => value.as_u64().ok_or_else(|| {
            OpenError::InvalidMetadata(format!("Field '{}' is not an unsigned integer", key))
        }),
        None => Err(OpenError::InvalidMetadata(format!(
            "Required field '{}' not found",
            key
        ))),
    }
}

fn optional_uint(map: &HashMap<String, DataValue>, key: &str) -> u64 {
    map.get(key).and_then(DataValue::as_u64).unwrap_or(0)
}
