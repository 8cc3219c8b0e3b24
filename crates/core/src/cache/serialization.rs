//! Pure functions for encoding typed values to and from cache bytes.
//!
//! Scalars are stored the way Redis clients conventionally store them: as
//! their decimal text form, so that the same entries remain readable from
//! `redis-cli` and usable by `INCRBY`. Booleans are stored as `0`/`1`.
//! Objects use JSON.

use serde::{de::DeserializeOwned, Serialize};

use super::{CacheError, Result};

/// A scalar type that can be stored in a cache entry.
pub trait CacheValue: Sized {
    /// Encodes the value to the bytes written to the store.
    fn encode(&self) -> Vec<u8>;

    /// Decodes bytes read from the store.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Decode` when the bytes are not a valid encoding.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

fn decode_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| CacheError::Decode(e.to_string()))
}

impl CacheValue for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_utf8(bytes).map(str::to_owned)
    }
}

impl CacheValue for i32 {
    fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_utf8(bytes)?
            .parse()
            .map_err(|e: std::num::ParseIntError| CacheError::Decode(e.to_string()))
    }
}

impl CacheValue for i64 {
    fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_utf8(bytes)?
            .parse()
            .map_err(|e: std::num::ParseIntError| CacheError::Decode(e.to_string()))
    }
}

impl CacheValue for f64 {
    /// Shortest representation that parses back to the same value.
    fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_utf8(bytes)?
            .parse()
            .map_err(|e: std::num::ParseFloatError| CacheError::Decode(e.to_string()))
    }
}

impl CacheValue for bool {
    fn encode(&self) -> Vec<u8> {
        if *self { b"1".to_vec() } else { b"0".to_vec() }
    }

    /// Any non-zero integer reads back as `true`.
    fn decode(bytes: &[u8]) -> Result<Self> {
        i64::decode(bytes).map(|n| n != 0)
    }
}

/// Serializes an object to JSON bytes.
///
/// # Errors
///
/// Returns `CacheError::Serialize` if the value cannot be represented as JSON
/// (for example a map with non-string keys).
pub fn serialize_object<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CacheError::Serialize(e.to_string()))
}

/// Deserializes JSON bytes to an object.
///
/// # Errors
///
/// Returns `CacheError::Decode` on malformed JSON or a shape mismatch.
pub fn deserialize_object<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Decode(e.to_string()))
}
