//! Test support: a small MMDB writer and a city fixture
//!
//! The library only reads databases, so tests build their own. The writer
//! produces real MaxMind DB v2 images: search tree, 16-byte separator,
//! data section, marker and metadata map.

#![allow(dead_code)]

use geoipd::mmdb::{IpVersion, RecordSize, METADATA_MARKER};
use geoipd::DataValue;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

const TYPE_POINTER: u8 = 1;
const TYPE_STRING: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_BYTES: u8 = 4;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_INT32: u8 = 8;
const TYPE_UINT64: u8 = 9;
const TYPE_UINT128: u8 = 10;
const TYPE_ARRAY: u8 = 11;
const TYPE_BOOL: u8 = 14;
const TYPE_FLOAT: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Node(u32),
    /// Data offset and the prefix length that put it there
    Data(u32, u8),
}

#[derive(Debug, Clone, Copy)]
struct Node {
    children: [Slot; 2],
}

impl Node {
    fn empty() -> Self {
        Node {
            children: [Slot::Empty; 2],
        }
    }
}

/// Builds an MMDB image in memory
pub struct MmdbWriter {
    ip_version: IpVersion,
    record_size: RecordSize,
    nodes: Vec<Node>,
    data: Vec<u8>,
    database_type: String,
    languages: Vec<String>,
    description: HashMap<String, String>,
    build_epoch: u64,
}

impl MmdbWriter {
    pub fn new(ip_version: IpVersion, record_size: RecordSize) -> Self {
        Self {
            ip_version,
            record_size,
            nodes: vec![Node::empty()],
            data: Vec::new(),
            database_type: "GeoIP2-City".to_string(),
            languages: vec!["en".to_string(), "de".to_string()],
            description: HashMap::from([(
                "en".to_string(),
                "geoipd test fixture".to_string(),
            )]),
            build_epoch: 1_700_000_000,
        }
    }

    pub fn database_type(mut self, database_type: &str) -> Self {
        self.database_type = database_type.to_string();
        self
    }

    /// Append a value to the data section and return its offset
    pub fn add_value(&mut self, value: &DataValue) -> u32 {
        let offset = self.data.len() as u32;
        encode_value(&mut self.data, value);
        offset
    }

    /// Append a pointer to `target` and return the pointer's own offset
    pub fn add_pointer(&mut self, target: u32) -> u32 {
        let offset = self.data.len() as u32;
        encode_pointer(&mut self.data, target);
        offset
    }

    /// Append a pointer that points at itself
    pub fn add_pointer_cycle(&mut self) -> u32 {
        let offset = self.data.len() as u32;
        encode_pointer(&mut self.data, offset);
        offset
    }

    /// Append raw bytes to the data section
    pub fn add_raw(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Grow the data section so later values land at large offsets
    pub fn pad_data(&mut self, len: usize) {
        self.data.resize(self.data.len() + len, 0);
    }

    /// Map a network ("1.2.3.0/24", "2001:db8::/32" or a bare address) to a data offset
    ///
    /// IPv4 networks in an IPv6 tree go under `::/96`. Insertion order does
    /// not matter: the longest prefix always wins.
    pub fn insert(&mut self, network: &str, offset: u32) {
        let (addr, prefix_len) = parse_network(network);

        let (bits, prefix_len) = match (addr, self.ip_version) {
            (IpAddr::V4(v4), IpVersion::V4) => ((u32::from(v4) as u128) << 96, prefix_len),
            (IpAddr::V4(v4), IpVersion::V6) => (u32::from(v4) as u128, prefix_len + 96),
            (IpAddr::V6(v6), IpVersion::V6) => (u128::from(v6), prefix_len),
            (IpAddr::V6(_), IpVersion::V4) => panic!("IPv6 network {} in IPv4 tree", network),
        };
        assert!(prefix_len > 0, "cannot insert a /0 network");

        let mut node = 0u32;
        for depth in 0..prefix_len {
            let bit = ((bits >> (127 - depth as u32)) & 1) as usize;
            let is_last = depth + 1 == prefix_len;
            let slot = self.nodes[node as usize].children[bit];

            if is_last {
                match slot {
                    Slot::Node(child) => self.backfill(child, offset, prefix_len),
                    Slot::Data(_, existing) if existing > prefix_len => {}
                    _ => self.nodes[node as usize].children[bit] = Slot::Data(offset, prefix_len),
                }
                return;
            }

            node = match slot {
                Slot::Node(child) => child,
                // Split a less specific network so both halves keep its data
                Slot::Empty | Slot::Data(..) => {
                    let child = self.nodes.len() as u32;
                    self.nodes.push(Node {
                        children: [slot; 2],
                    });
                    self.nodes[node as usize].children[bit] = Slot::Node(child);
                    child
                }
            };
        }
    }

    /// Encode `value` and map `network` to it
    pub fn insert_value(&mut self, network: &str, value: &DataValue) -> u32 {
        let offset = self.add_value(value);
        self.insert(network, offset);
        offset
    }

    fn backfill(&mut self, node: u32, offset: u32, prefix_len: u8) {
        for bit in 0..2 {
            match self.nodes[node as usize].children[bit] {
                Slot::Node(child) => self.backfill(child, offset, prefix_len),
                Slot::Data(_, existing) if existing > prefix_len => {}
                _ => self.nodes[node as usize].children[bit] = Slot::Data(offset, prefix_len),
            }
        }
    }

    fn record_value(&self, slot: Slot) -> u32 {
        let node_count = self.nodes.len() as u32;
        match slot {
            Slot::Empty => node_count,
            Slot::Node(id) => id,
            Slot::Data(offset, _) => node_count + 16 + offset,
        }
    }

    fn write_tree(&self, out: &mut Vec<u8>) {
        for node in &self.nodes {
            let left = self.record_value(node.children[0]);
            let right = self.record_value(node.children[1]);
            match self.record_size {
                RecordSize::Bits24 => {
                    assert!(left < 1 << 24 && right < 1 << 24, "record too large for 24 bits");
                    out.extend_from_slice(&left.to_be_bytes()[1..]);
                    out.extend_from_slice(&right.to_be_bytes()[1..]);
                }
                RecordSize::Bits28 => {
                    assert!(left < 1 << 28 && right < 1 << 28, "record too large for 28 bits");
                    out.extend_from_slice(&left.to_be_bytes()[1..]);
                    out.push((((left >> 24) & 0x0F) << 4 | ((right >> 24) & 0x0F)) as u8);
                    out.extend_from_slice(&right.to_be_bytes()[1..]);
                }
                RecordSize::Bits32 => {
                    out.extend_from_slice(&left.to_be_bytes());
                    out.extend_from_slice(&right.to_be_bytes());
                }
            }
        }
    }

    fn metadata(&self) -> DataValue {
        map(vec![
            ("binary_format_major_version", DataValue::Uint16(2)),
            ("binary_format_minor_version", DataValue::Uint16(0)),
            ("build_epoch", DataValue::Uint64(self.build_epoch)),
            ("database_type", string(&self.database_type)),
            (
                "description",
                DataValue::Map(
                    self.description
                        .iter()
                        .map(|(k, v)| (k.clone(), string(v)))
                        .collect(),
                ),
            ),
            ("ip_version", DataValue::Uint16(self.ip_version.number() as u16)),
            (
                "languages",
                DataValue::Array(self.languages.iter().map(|l| string(l)).collect()),
            ),
            ("node_count", DataValue::Uint32(self.nodes.len() as u32)),
            ("record_size", DataValue::Uint16(self.record_size.bits())),
        ])
    }

    /// Serialize the whole image
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_tree(&mut out);
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(METADATA_MARKER);
        encode_value(&mut out, &self.metadata());
        out
    }

    /// Serialize into `dir/name`
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("write fixture");
        path
    }
}

fn parse_network(network: &str) -> (IpAddr, u8) {
    match network.split_once('/') {
        Some((addr, len)) => (
            addr.parse().expect("network address"),
            len.parse().expect("prefix length"),
        ),
        None => {
            let addr: IpAddr = network.parse().expect("address");
            let len = if addr.is_ipv4() { 32 } else { 128 };
            (addr, len)
        }
    }
}

/// Encode one value in MMDB data section format
pub fn encode_value(out: &mut Vec<u8>, value: &DataValue) {
    match value {
        DataValue::Pointer(target) => encode_pointer(out, *target),
        DataValue::String(s) => {
            write_control(out, TYPE_STRING, s.len());
            out.extend_from_slice(s.as_bytes());
        }
        DataValue::Double(d) => {
            write_control(out, TYPE_DOUBLE, 8);
            out.extend_from_slice(&d.to_be_bytes());
        }
        DataValue::Bytes(b) => {
            write_control(out, TYPE_BYTES, b.len());
            out.extend_from_slice(b);
        }
        DataValue::Uint16(v) => write_uint(out, TYPE_UINT16, *v as u128),
        DataValue::Uint32(v) => write_uint(out, TYPE_UINT32, *v as u128),
        DataValue::Uint64(v) => write_uint(out, TYPE_UINT64, *v as u128),
        DataValue::Uint128(v) => write_uint(out, TYPE_UINT128, *v),
        DataValue::Int32(v) => {
            write_control(out, TYPE_INT32, 4);
            out.extend_from_slice(&v.to_be_bytes());
        }
        DataValue::Map(entries) => {
            write_control(out, TYPE_MAP, entries.len());
            // Sorted for reproducible images
            let mut keys: Vec<_> = entries.keys().collect();
            keys.sort();
            for key in keys {
                encode_value(out, &DataValue::String(key.clone()));
                encode_value(out, &entries[key]);
            }
        }
        DataValue::Array(items) => {
            write_control(out, TYPE_ARRAY, items.len());
            for item in items {
                encode_value(out, item);
            }
        }
        DataValue::Bool(b) => write_control(out, TYPE_BOOL, *b as usize),
        DataValue::Float(f) => {
            write_control(out, TYPE_FLOAT, 4);
            out.extend_from_slice(&f.to_be_bytes());
        }
    }
}

fn write_uint(out: &mut Vec<u8>, type_id: u8, value: u128) {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    write_control(out, type_id, bytes.len() - first);
    out.extend_from_slice(&bytes[first..]);
}

fn write_control(out: &mut Vec<u8>, type_id: u8, size: usize) {
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, vec![])
    } else if size < 285 {
        (29, vec![(size - 29) as u8])
    } else if size < 65_821 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
    };

    if type_id <= 7 {
        out.push(type_id << 5 | size_bits);
    } else {
        out.push(size_bits);
        out.push(type_id - 7);
    }
    out.extend_from_slice(&extra);
}

/// Encode a pointer using the shortest form that fits
pub fn encode_pointer(out: &mut Vec<u8>, target: u32) {
    let ctrl = TYPE_POINTER << 5;
    if target < 2048 {
        out.push(ctrl | ((target >> 8) & 0x7) as u8);
        out.push(target as u8);
    } else if target < 526_336 {
        let v = target - 2048;
        out.push(ctrl | 0x08 | ((v >> 16) & 0x7) as u8);
        out.extend_from_slice(&v.to_be_bytes()[2..]);
    } else if target < 526_336 + (1 << 27) {
        let v = target - 526_336;
        out.push(ctrl | 0x10 | ((v >> 24) & 0x7) as u8);
        out.extend_from_slice(&v.to_be_bytes()[1..]);
    } else {
        out.push(ctrl | 0x18);
        out.extend_from_slice(&target.to_be_bytes());
    }
}

pub fn string(s: &str) -> DataValue {
    DataValue::String(s.to_string())
}

pub fn map(entries: Vec<(&str, DataValue)>) -> DataValue {
    DataValue::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

/// `{"names": {"en": .., ...}}`
pub fn names(entries: &[(&str, &str)]) -> DataValue {
    map(vec![(
        "names",
        map(entries.iter().map(|(lang, name)| (*lang, string(name))).collect()),
    )])
}

/// A GeoIP2-City style record
///
/// `subdivisions: None` omits the key entirely.
pub fn city_record(country: &str, city: Option<&str>, subdivisions: Option<&[&str]>) -> DataValue {
    let mut entries = vec![(
        "country",
        map(vec![
            ("iso_code", string(country)),
            ("names", map(vec![("en", string(country))])),
        ]),
    )];
    if let Some(city) = city {
        entries.push(("city", names(&[("en", city)])));
    }
    if let Some(subdivisions) = subdivisions {
        entries.push((
            "subdivisions",
            DataValue::Array(subdivisions.iter().map(|s| names(&[("en", s)])).collect()),
        ));
    }
    entries.push((
        "location",
        map(vec![
            ("latitude", DataValue::Double(37.386)),
            ("longitude", DataValue::Double(-122.0838)),
            ("accuracy_radius", DataValue::Uint16(1000)),
        ]),
    ));
    map(entries)
}

/// Networks in the standard fixture and what they resolve to
pub struct Expected {
    pub ip: &'static str,
    pub country: Option<&'static str>,
    pub city: Option<&'static str>,
    /// `Ok(None)` means the record has no subdivisions
    pub subdivision: Result<Option<&'static str>, ()>,
}

/// Addresses covered by every fixture, IPv4 and IPv6 trees alike
pub const IPV4_EXPECTED: &[Expected] = &[
    Expected {
        ip: "1.0.0.1",
        country: Some("US"),
        city: Some("Mountain View"),
        subdivision: Ok(Some("California")),
    },
    Expected {
        ip: "2.125.160.217",
        country: Some("GB"),
        city: Some("Boxford"),
        subdivision: Ok(Some("England")),
    },
    Expected {
        ip: "89.160.20.120",
        country: Some("SE"),
        city: Some("Linköping"),
        subdivision: Ok(None),
    },
    Expected {
        ip: "216.160.83.60",
        country: Some("US"),
        city: Some("Milton"),
        subdivision: Ok(None),
    },
    Expected {
        ip: "67.43.156.1",
        country: Some("BT"),
        city: None,
        subdivision: Ok(None),
    },
    Expected {
        ip: "175.16.199.255",
        country: Some("CN"),
        city: Some("Changchun"),
        subdivision: Ok(Some("Jilin Sheng")),
    },
];

/// Addresses only present in IPv6 fixtures
pub const IPV6_EXPECTED: &[Expected] = &[
    Expected {
        ip: "2001:218::1",
        country: Some("JP"),
        city: Some("Tokyo"),
        subdivision: Ok(Some("Tokyo")),
    },
    Expected {
        ip: "2a02:d280::abcd",
        country: Some("CZ"),
        city: Some("Prague"),
        subdivision: Ok(Some("Hlavni mesto Praha")),
    },
];

/// Addresses outside every fixture network
pub const MISSES: &[&str] = &["10.0.0.1", "1.0.1.1", "255.255.255.255", "0.0.0.0"];

/// Build the standard city fixture
///
/// The two US records share one country map through a pointer.
pub fn city_fixture(ip_version: IpVersion, record_size: RecordSize) -> MmdbWriter {
    let mut writer = MmdbWriter::new(ip_version, record_size);

    let us = writer.add_value(&map(vec![
        ("iso_code", string("US")),
        ("names", map(vec![("en", string("United States"))])),
    ]));

    writer.insert_value(
        "1.0.0.0/24",
        &map(vec![
            ("country", DataValue::Pointer(us)),
            ("city", names(&[("en", "Mountain View"), ("de", "Mountain View")])),
            (
                "subdivisions",
                DataValue::Array(vec![
                    names(&[("en", "California"), ("de", "Kalifornien")]),
                    names(&[("en", "Santa Clara County")]),
                ]),
            ),
        ]),
    );
    writer.insert_value(
        "216.160.83.56/29",
        &map(vec![
            ("country", DataValue::Pointer(us)),
            ("city", names(&[("en", "Milton")])),
        ]),
    );
    writer.insert_value(
        "2.125.160.216/29",
        &city_record("GB", Some("Boxford"), Some(&["England", "West Berkshire"])),
    );
    writer.insert_value("89.160.20.112/28", &city_record("SE", Some("Linköping"), Some(&[])));
    writer.insert_value("67.43.156.0/24", &city_record("BT", None, None));
    writer.insert_value(
        "175.16.199.0/24",
        &city_record("CN", Some("Changchun"), Some(&["Jilin Sheng"])),
    );

    if ip_version == IpVersion::V6 {
        writer.insert_value(
            "2001:218::/32",
            &city_record("JP", Some("Tokyo"), Some(&["Tokyo"])),
        );
        writer.insert_value(
            "2a02:d280::/29",
            &city_record("CZ", Some("Prague"), Some(&["Hlavni mesto Praha"])),
        );
    }

    writer
}

/// Every tree shape the reader supports
pub fn all_layouts() -> Vec<(IpVersion, RecordSize)> {
    let mut layouts = Vec::new();
    for ip_version in [IpVersion::V4, IpVersion::V6] {
        for record_size in [RecordSize::Bits24, RecordSize::Bits28, RecordSize::Bits32] {
            layouts.push((ip_version, record_size));
        }
    }
    layouts
}
