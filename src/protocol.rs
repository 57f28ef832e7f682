//! Wire protocol encoding and decoding
//!
//! Message format:
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: JSON payload
//!
//! Requests carry a method and an address; responses carry either a name
//! or an error code with a message.

use crate::error::QueryError;
use crate::service::{IpRequest, Method, NameResponse};
use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::io;

/// Maximum allowed message size (64KB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Code sent when a frame cannot be decoded
pub const PROTOCOL_ERROR_CODE: &str = "PROTOCOL_ERROR";

/// A query on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Which query to run
    pub method: Method,
    /// Textual IP address
    pub ip: String,
}

impl Request {
    /// Build a request
    pub fn new(method: Method, ip: impl Into<String>) -> Self {
        Self {
            method,
            ip: ip.into(),
        }
    }

    /// The service-level input
    pub fn to_ip_request(&self) -> IpRequest {
        IpRequest::new(self.ip.clone())
    }
}

/// A reply on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// The query resolved
    Ok {
        /// Resolved name
        name: String,
    },
    /// The query failed
    Error {
        /// Stable error code
        code: String,
        /// Human-readable message
        message: String,
    },
}

impl From<Result<NameResponse, QueryError>> for Response {
    fn from(result: Result<NameResponse, QueryError>) -> Self {
        match result {
            Ok(NameResponse { name }) => Response::Ok { name },
            Err(e) => Response::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// Protocol errors
#[derive(Debug)]
pub enum ProtocolError {
    /// Message exceeds maximum allowed size
    MessageTooLarge(usize),
    /// JSON serialization/deserialization error
    Json(serde_json::Error),
    /// Socket error
    Io(io::Error),
    /// Peer closed the connection mid-frame
    UnexpectedEof,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MessageTooLarge(size) => {
                write!(
                    f,
                    "Message too large: {} bytes (max: {})",
                    size, MAX_MESSAGE_SIZE
                )
            }
            ProtocolError::Json(e) => write!(f, "JSON error: {}", e),
            ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
            ProtocolError::UnexpectedEof => write!(f, "Connection closed mid-frame"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Json(e) => Some(e),
            ProtocolError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Json(err)
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        ProtocolError::Io(err)
    }
}

/// Encode a message for transmission
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;

    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(json.len()));
    }

    let mut buf = Vec::with_capacity(4 + json.len());
    buf.put_u32(json.len() as u32);
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Decode a message from a buffer
///
/// Returns:
/// - `Ok(Some(msg))` - Complete message decoded, buffer advanced
/// - `Ok(None)` - Need more data (buffer unchanged)
/// - `Err(e)` - Protocol error
pub fn decode<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, ProtocolError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length without consuming
    let length = (&buf[..4]).get_u32() as usize;

    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(length));
    }

    if buf.len() < 4 + length {
        return Ok(None);
    }

    buf.advance(4);
    let json_bytes = buf.split_to(length);

    let msg = serde_json::from_slice(&json_bytes)?;
    Ok(Some(msg))
}
