//! MMDB Search Tree Traversal
//!
//! Implements binary search tree traversal for IP address lookups.
//! Each node contains two records (left for bit 0, right for bit 1)
//! holding one of:
//! - a node index (`< node_count`): continue traversal
//! - the "no data" marker (`== node_count`): not found
//! - a data pointer (`> node_count`): found, offset `record - node_count - 16`

use super::format::MmdbHeader;
use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use crate::error::DecodeError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Result of an IP lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupResult {
    /// Offset into the data section (relative to data section start)
    pub data_offset: u32,
    /// Depth of the terminal record; IPv4-relative for IPv4 lookups
    pub prefix_len: u8,
}

/// Search tree over a database image
pub struct SearchTree<'a> {
    /// The raw file data containing the tree
    data: &'a [u8],
    /// Parsed layout information
    header: &'a MmdbHeader,
    /// Record at which IPv4 lookups begin in an IPv6 tree
    ipv4_start: Option<u32>,
}

impl<'a> SearchTree<'a> {
    /// Create a new search tree
    pub fn new(data: &'a [u8], header: &'a MmdbHeader) -> Self {
        Self {
            data,
            header,
            ipv4_start: None,
        }
    }

    /// Reuse a previously computed IPv4 start record
    pub fn with_ipv4_start(mut self, record: u32) -> Self {
        self.ipv4_start = Some(record);
        self
    }

    /// Look up an IP address
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<LookupResult>, DecodeError> {
        match ip {
            IpAddr::V4(addr) => self.lookup_v4(addr),
            IpAddr::V6(addr) => self.lookup_v6(addr),
        }
    }

    /// Look up an IPv4 address
    pub fn lookup_v4(&self, addr: Ipv4Addr) -> Result<Option<LookupResult>, DecodeError> {
        let start = match self.header.ip_version {
            IpVersion::V4 => 0,
            IpVersion::V6 => match self.ipv4_start {
                Some(record) => record,
                None => self.find_ipv4_start()?,
            },
        };
        let bits = (u32::from(addr) as u128) << 96;
        self.walk(start, bits, IpVersion::V4.bit_count())
    }

    /// Look up an IPv6 address
    ///
    /// In an IPv4-only tree, IPv4-mapped addresses (`::ffff:a.b.c.d`) are
    /// looked up as IPv4; any other IPv6 address has no data.
    pub fn lookup_v6(&self, addr: Ipv6Addr) -> Result<Option<LookupResult>, DecodeError> {
        match self.header.ip_version {
            IpVersion::V6 => self.walk(0, u128::from(addr), IpVersion::V6.bit_count()),
            IpVersion::V4 => match addr.to_ipv4_mapped() {
                Some(v4) => self.lookup_v4(v4),
                None => Ok(None),
            },
        }
    }

    /// Find the record where IPv4 lookups begin in an IPv6 tree
    ///
    /// IPv4 addresses live under `::/96`, so follow 96 zero bits from the
    /// root. Stops early if the walk leaves the node range.
    pub fn find_ipv4_start(&self) -> Result<u32, DecodeError> {
        let mut record = 0u32;
        for _ in 0..96 {
            if record >= self.header.node_count {
                break;
            }
            record = self.read_record(record, 0)?;
        }
        Ok(record)
    }

    /// Walk from `record`, consuming the top `bit_count` bits of `bits`
    fn walk(
        &self,
        mut record: u32,
        bits: u128,
        bit_count: u8,
    ) -> Result<Option<LookupResult>, DecodeError> {
        let node_count = self.header.node_count;
        let mut depth = 0u8;

        loop {
            if record == node_count {
                return Ok(None);
            }
            if record > node_count {
                let data_offset = self.calculate_data_offset(record)?;
                return Ok(Some(LookupResult {
                    data_offset,
                    prefix_len: depth,
                }));
            }
            if depth == bit_count {
                // Address fully consumed without reaching a terminal record
                return Ok(None);
            }

            let bit = ((bits >> (127 - depth as u32)) & 1) as u8;
            record = self.read_record(record, bit)?;
            depth += 1;
        }
    }

    /// Read a record from a node
    ///
    /// `side` 0 is the left record (bit 0), 1 is the right record (bit 1).
    fn read_record(&self, node: u32, side: u8) -> Result<u32, DecodeError> {
        if node >= self.header.node_count {
            return Err(DecodeError::CorruptTree(format!(
                "Node index {} exceeds node count {}",
                node, self.header.node_count
            )));
        }

        let node_bytes = self.header.record_size.node_bytes();
        let node_offset = node as usize * node_bytes;
        let bytes = self
            .data
            .get(node_offset..node_offset + node_bytes)
            .filter(|_| node_offset + node_bytes <= self.header.tree_size)
            .ok_or_else(|| {
                DecodeError::CorruptTree(format!(
                    "Node {} at offset {} exceeds tree size {}",
                    node, node_offset, self.header.tree_size
                ))
            })?;

        Ok(match self.header.record_size {
            RecordSize::Bits24 => {
                let r = &bytes[side as usize * 3..side as usize * 3 + 3];
                u32::from_be_bytes([0, r[0], r[1], r[2]])
            }
            RecordSize::Bits28 => {
                // Layout: [left 24 bits][middle byte][right 24 bits]
                // The middle byte holds the 4 high bits of each record.
                if side == 0 {
                    let high = (bytes[3] >> 4) as u32;
                    (high << 24) | u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
                } else {
                    let high = (bytes[3] & 0x0F) as u32;
                    (high << 24) | u32::from_be_bytes([0, bytes[4], bytes[5], bytes[6]])
                }
            }
            RecordSize::Bits32 => {
                let r = &bytes[side as usize * 4..side as usize * 4 + 4];
                u32::from_be_bytes([r[0], r[1], r[2], r[3]])
            }
        })
    }

    /// Calculate data section offset from a data pointer record
    fn calculate_data_offset(&self, record: u32) -> Result<u32, DecodeError> {
        let offset = record
            .checked_sub(self.header.node_count)
            .and_then(|r| r.checked_sub(DATA_SECTION_SEPARATOR_SIZE as u32))
            .ok_or_else(|| {
                DecodeError::CorruptTree(format!(
                    "Record {} points into the data section separator (node_count = {})",
                    record, self.header.node_count
                ))
            })?;

        if offset as usize >= self.header.data_section_len() {
            return Err(DecodeError::CorruptTree(format!(
                "Data pointer {} exceeds data section size {}",
                offset,
                self.header.data_section_len()
            )));
        }

        Ok(offset)
    }
}
