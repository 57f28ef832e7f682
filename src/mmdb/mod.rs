//! MaxMind DB (MMDB) Reader
//!
//! The MMDB format stores a binary search tree keyed on IP address bits,
//! followed by a 16-byte separator, a data section of self-describing
//! records, and a metadata map after a fixed marker near the end of file.
//!
//! ## Architecture
//!
//! - **types**: MMDB-specific types and constants
//! - **format**: Metadata marker search and header extraction
//! - **tree**: Search tree traversal for IP lookups
//!
//! Record decoding lives in `crate::data_section`.

pub mod format;
pub mod tree;
pub mod types;

pub use format::{find_metadata_marker, Metadata, MmdbHeader};
pub use tree::{LookupResult, SearchTree};
pub use types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
