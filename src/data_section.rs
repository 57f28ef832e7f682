//! Data section decoding for MMDB records
//!
//! Implements the MaxMind DB data type encoding for reading the
//! self-describing records stored after the search tree.
//!
//! # Supported Types
//!
//! - **Pointer**: Reference to another data item (followed under a depth cap)
//! - **String**: UTF-8 text data
//! - **Double**: 64-bit floating point (IEEE 754)
//! - **Bytes**: Raw byte arrays
//! - **Uint16** / **Uint32** / **Uint64** / **Uint128**: big-endian unsigned integers
//! - **Map**: Key-value pairs (string keys)
//! - **Int32**: Signed 32-bit integers
//! - **Array**: Ordered lists of values
//! - **Bool**: Boolean values
//! - **Float**: 32-bit floating point (IEEE 754)
//!
//! # Format
//!
//! Every value starts with a control byte: type in the top 3 bits, size in
//! the low 5 bits. Type 0 means "extended": the following byte holds
//! `type - 7`. Sizes 29, 30 and 31 are followed by 1, 2 or 3 size bytes.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::error::DecodeError;
use std::cell::Cell;
use std::collections::HashMap;

/// Maximum number of pointer hops plus container nesting levels in one decode.
pub const MAX_DECODE_DEPTH: usize = 64;

/// Maximum number of values (pointers included) produced by one decode.
///
/// Shared pointers let a few bytes expand into exponentially many values,
/// which the depth cap alone does not bound.
pub const MAX_DECODE_VALUES: usize = 1 << 16;

const TYPE_EXTENDED: u8 = 0;
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

/// A decoded data section value
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Pointer to another data item (offset into the data section)
    Pointer(u32),
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (MMDB maps only have string keys)
    Map(HashMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// Borrow the string payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the map payload, if this is a map
    pub fn as_map(&self) -> Option<&HashMap<String, DataValue>> {
        match self {
            DataValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow the array payload, if this is an array
    pub fn as_array(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Look up a key if this is a map
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Widen any unsigned integer variant to u64
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(n) => Some(*n as u64),
            DataValue::Uint32(n) => Some(*n as u64),
            DataValue::Uint64(n) => Some(*n),
            DataValue::Uint128(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }
}

/// Data section decoder
///
/// Borrows the data section of a database image. Pointer targets are
/// relative to the start of the buffer.
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
    /// Values produced by the current top-level decode
    decoded: Cell<usize>,
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder over a data section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            decoded: Cell::new(0),
        }
    }

    /// Decode the value at `offset`, following pointers
    pub fn decode(&self, offset: u32) -> Result<DataValue, DecodeError> {
        self.decoded.set(0);
        let mut cursor = offset as usize;
        self.decode_at(&mut cursor, 0)
    }

    /// Decode the value at `offset` without following a top-level pointer
    ///
    /// A pointer at `offset` comes back as `DataValue::Pointer(target)`.
    /// Pointers nested inside maps and arrays are still resolved.
    pub fn decode_unresolved(&self, offset: u32) -> Result<DataValue, DecodeError> {
        self.decoded.set(0);
        let mut cursor = offset as usize;
        let (type_id, size_bits) = self.read_control(&mut cursor)?;
        if type_id == TYPE_POINTER {
            return Ok(DataValue::Pointer(self.read_pointer(&mut cursor, size_bits)?));
        }
        self.decode_payload(type_id, size_bits, &mut cursor, 0)
    }

    fn decode_at(&self, cursor: &mut usize, depth: usize) -> Result<DataValue, DecodeError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(DecodeError::DepthExceeded(MAX_DECODE_DEPTH));
        }
        let decoded = self.decoded.get() + 1;
        if decoded > MAX_DECODE_VALUES {
            return Err(DecodeError::TooManyValues(MAX_DECODE_VALUES));
        }
        self.decoded.set(decoded);

        let (type_id, size_bits) = self.read_control(cursor)?;
        if type_id == TYPE_POINTER {
            // The caller's cursor moves past the pointer; the target is
            // decoded from its own cursor.
            let target = self.read_pointer(cursor, size_bits)?;
            let mut target_cursor = target as usize;
            return self.decode_at(&mut target_cursor, depth + 1);
        }
        self.decode_payload(type_id, size_bits, cursor, depth)
    }

    /// Read the control byte (and extended type byte), returning (type, size bits)
    fn read_control(&self, cursor: &mut usize) -> Result<(u8, u8), DecodeError> {
        let ctrl = *self.buffer.get(*cursor).ok_or(DecodeError::OutOfBounds {
            offset: *cursor,
            len: self.buffer.len(),
        })?;
        *cursor += 1;

        let mut type_id = ctrl >> 5;
        if type_id == TYPE_EXTENDED {
            let ext = self.take(cursor, 1, "extended type")?[0];
            type_id = ext.checked_add(7).ok_or(DecodeError::InvalidType(ext))?;
            if !(TYPE_INT32..=TYPE_FLOAT).contains(&type_id) {
                return Err(DecodeError::InvalidType(type_id));
            }
        }
        Ok((type_id, ctrl & 0x1F))
    }

    fn decode_payload(
        &self,
        type_id: u8,
        size_bits: u8,
        cursor: &mut usize,
        depth: usize,
    ) -> Result<DataValue, DecodeError> {
        // Bool carries its value in the size bits
        if type_id == TYPE_BOOL {
            return match size_bits {
                0 => Ok(DataValue::Bool(false)),
                1 => Ok(DataValue::Bool(true)),
                n => Err(DecodeError::InvalidSize {
                    kind: "bool",
                    size: n as usize,
                }),
            };
        }

        let size = self.decode_size(cursor, size_bits)?;

        match type_id {
            TYPE_STRING => {
                let bytes = self.take(cursor, size, "string")?;
                let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
                Ok(DataValue::String(s.to_string()))
            }
            TYPE_DOUBLE => {
                if size != 8 {
                    return Err(DecodeError::InvalidSize { kind: "double", size });
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(self.take(cursor, 8, "double")?);
                Ok(DataValue::Double(f64::from_be_bytes(bytes)))
            }
            TYPE_BYTES => Ok(DataValue::Bytes(self.take(cursor, size, "bytes")?.to_vec())),
            TYPE_UINT16 => Ok(DataValue::Uint16(self.read_uint(cursor, size, 2, "uint16")? as u16)),
            TYPE_UINT32 => Ok(DataValue::Uint32(self.read_uint(cursor, size, 4, "uint32")? as u32)),
            TYPE_INT32 => Ok(DataValue::Int32(self.read_uint(cursor, size, 4, "int32")? as u32 as i32)),
            TYPE_UINT64 => Ok(DataValue::Uint64(self.read_uint(cursor, size, 8, "uint64")? as u64)),
            TYPE_UINT128 => Ok(DataValue::Uint128(self.read_uint(cursor, size, 16, "uint128")?)),
            TYPE_MAP => self.decode_map(cursor, size, depth),
            TYPE_ARRAY => self.decode_array(cursor, size, depth),
            TYPE_FLOAT => {
                if size != 4 {
                    return Err(DecodeError::InvalidSize { kind: "float", size });
                }
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(self.take(cursor, 4, "float")?);
                Ok(DataValue::Float(f32::from_be_bytes(bytes)))
            }
            other => Err(DecodeError::InvalidType(other)),
        }
    }

    fn decode_map(
        &self,
        cursor: &mut usize,
        count: usize,
        depth: usize,
    ) -> Result<DataValue, DecodeError> {
        // Each entry needs at least two bytes; don't trust the count for allocation
        let mut map = HashMap::with_capacity(count.min(self.remaining(*cursor) / 2));

        for _ in 0..count {
            let key = match self.decode_at(cursor, depth + 1)? {
                DataValue::String(s) => s,
                _ => return Err(DecodeError::InvalidMapKey),
            };
            let value = self.decode_at(cursor, depth + 1)?;
            map.insert(key, value);
        }

        Ok(DataValue::Map(map))
    }

    fn decode_array(
        &self,
        cursor: &mut usize,
        count: usize,
        depth: usize,
    ) -> Result<DataValue, DecodeError> {
        let mut array = Vec::with_capacity(count.min(self.remaining(*cursor)));

        for _ in 0..count {
            array.push(self.decode_at(cursor, depth + 1)?);
        }

        Ok(DataValue::Array(array))
    }

    /// Read a pointer payload
    ///
    /// Control byte layout is `001SSVVV`: SS selects how many bytes follow,
    /// VVV are the high bits of the offset for the three shorter forms.
    fn read_pointer(&self, cursor: &mut usize, size_bits: u8) -> Result<u32, DecodeError> {
        let pointer_size = (size_bits >> 3) & 0x3;
        let high = (size_bits & 0x7) as u32;

        let offset = match pointer_size {
            0 => {
                let b = self.take(cursor, 1, "pointer")?;
                (high << 8) | b[0] as u32
            }
            1 => {
                let b = self.take(cursor, 2, "pointer")?;
                2048 + ((high << 16) | (b[0] as u32) << 8 | b[1] as u32)
            }
            2 => {
                let b = self.take(cursor, 3, "pointer")?;
                526_336 + ((high << 24) | (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32)
            }
            _ => {
                let b = self.take(cursor, 4, "pointer")?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]])
            }
        };

        Ok(offset)
    }

    fn decode_size(&self, cursor: &mut usize, size_bits: u8) -> Result<usize, DecodeError> {
        match size_bits {
            0..=28 => Ok(size_bits as usize),
            29 => {
                let b = self.take(cursor, 1, "size")?;
                Ok(29 + b[0] as usize)
            }
            30 => {
                let b = self.take(cursor, 2, "size")?;
                Ok(285 + u16::from_be_bytes([b[0], b[1]]) as usize)
            }
            _ => {
                let b = self.take(cursor, 3, "size")?;
                Ok(65_821 + ((b[0] as usize) << 16 | (b[1] as usize) << 8 | b[2] as usize))
            }
        }
    }

    /// Read a variable-width big-endian unsigned integer of `size` bytes
    fn read_uint(
        &self,
        cursor: &mut usize,
        size: usize,
        max: usize,
        kind: &'static str,
    ) -> Result<u128, DecodeError> {
        if size > max {
            return Err(DecodeError::InvalidSize { kind, size });
        }
        let bytes = self.take(cursor, size, kind)?;
        Ok(bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    fn take(&self, cursor: &mut usize, len: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = cursor.checked_add(len).ok_or(DecodeError::Truncated(what))?;
        let bytes = self
            .buffer
            .get(*cursor..end)
            .ok_or(DecodeError::Truncated(what))?;
        *cursor = end;
        Ok(bytes)
    }

    fn remaining(&self, cursor: usize) -> usize {
        self.buffer.len().saturating_sub(cursor)
    }
}
