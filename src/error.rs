/// Error types for the geoipd library
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors raised while opening a database image.
///
/// Any of these is fatal to startup: the service must not begin serving.
#[derive(Debug)]
pub enum OpenError {
    /// The file could not be opened, mapped or decompressed
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
    /// No database file was found in any search directory
    NotResolved(String),
    /// The metadata marker is missing from the end of the file
    MetadataNotFound,
    /// Metadata decoded but is missing or has invalid fields
    InvalidMetadata(String),
    /// Binary format major version is not supported
    UnsupportedVersion(u64),
    /// The search tree or data section extends past the end of the file
    Truncated(String),
    /// The search tree could not be walked at open time
    Corrupt(String),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::Io { path, source } => {
                write!(f, "Failed to open {}: {}", path.display(), source)
            }
            OpenError::NotResolved(msg) => write!(f, "Database not found: {}", msg),
            OpenError::MetadataNotFound => write!(f, "MMDB metadata marker not found"),
            OpenError::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
            OpenError::UnsupportedVersion(v) => {
                write!(f, "Unsupported binary format major version: {}", v)
            }
            OpenError::Truncated(msg) => write!(f, "Truncated database: {}", msg),
            OpenError::Corrupt(msg) => write!(f, "Corrupt database: {}", msg),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised while decoding records or walking the search tree.
///
/// These indicate corrupt database content and are local to one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Offset lies outside the data section
    OutOfBounds {
        /// Offending offset
        offset: usize,
        /// Length of the buffer being decoded
        len: usize,
    },
    /// Control byte carries an unknown or disallowed type
    InvalidType(u8),
    /// A size field or payload runs past the end of the buffer
    Truncated(&'static str),
    /// A payload has a size its type does not permit
    InvalidSize {
        /// Type name
        kind: &'static str,
        /// Declared size
        size: usize,
    },
    /// String payload is not valid UTF-8
    InvalidUtf8,
    /// A map key did not decode to a string
    InvalidMapKey,
    /// Pointer chain or container nesting exceeded the depth cap
    DepthExceeded(usize),
    /// One decode produced more values than the per-record cap
    TooManyValues(usize),
    /// A search tree record points somewhere it cannot
    CorruptTree(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::OutOfBounds { offset, len } => {
                write!(f, "Offset {} out of bounds (data section is {} bytes)", offset, len)
            }
            DecodeError::InvalidType(t) => write!(f, "Invalid data type {}", t),
            DecodeError::Truncated(what) => write!(f, "Truncated {}", what),
            DecodeError::InvalidSize { kind, size } => {
                write!(f, "Invalid size {} for {}", size, kind)
            }
            DecodeError::InvalidUtf8 => write!(f, "Invalid UTF-8 in string"),
            DecodeError::InvalidMapKey => write!(f, "Map key is not a string"),
            DecodeError::DepthExceeded(max) => {
                write!(f, "Decode depth exceeded {} (pointer cycle or corrupt nesting)", max)
            }
            DecodeError::TooManyValues(max) => {
                write!(f, "Record expands to more than {} values", max)
            }
            DecodeError::CorruptTree(msg) => write!(f, "Corrupt search tree: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Declared failures of the lookup service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The supplied text is not an IP address
    InvalidInput(String),
    /// No prefix matches, or the requested field is absent
    NotFound,
    /// The record decoded but carries no subdivisions
    NoSubdivisions,
    /// The database content for this address is corrupt
    Decode(DecodeError),
}

impl QueryError {
    /// Stable code carried on the wire
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidInput(_) => "INVALID_INPUT",
            QueryError::NotFound => "NOT_FOUND",
            QueryError::NoSubdivisions => "NO_SUBDIVISIONS",
            QueryError::Decode(_) => "DECODE_ERROR",
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidInput(ip) => write!(f, "cannot query ip: invalid address {:?}", ip),
            QueryError::NotFound => write!(f, "cannot query ip: no data"),
            QueryError::NoSubdivisions => write!(f, "cannot query ip: no subdivisions"),
            QueryError::Decode(e) => write!(f, "cannot query ip: {}", e),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for QueryError {
    fn from(err: DecodeError) -> Self {
        QueryError::Decode(err)
    }
}
