//! Value serialization between application values and stored representation.
//!
//! Every [`Serde`] implementation must satisfy the round-trip law:
//! `deserialize(serialize(v))` is equivalent to `v`.
//!
//! # Envelope format
//!
//! [`PostcardSerde`] wraps its payload in a versioned envelope so that
//! entries written by an incompatible schema are rejected instead of
//! silently misread:
//!
//! ```text
//! [MAGIC: 4 bytes] [VERSION: 4 bytes, little-endian] [POSTCARD PAYLOAD]
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Magic header identifying envelopes written by this crate.
pub const CACHE_MAGIC: [u8; 4] = *b"BCAC";

/// Current envelope schema version. Bump when the payload layout changes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Converts values to and from the backend's storage representation.
pub trait Serde: Send + Sync {
    /// Application value type.
    type Value;

    /// Representation stored in the backend.
    type Stored;

    fn serialize(&self, value: Self::Value) -> Result<Self::Stored>;

    fn deserialize(&self, stored: Self::Stored) -> Result<Self::Value>;
}

/// Identity serde: values are stored as-is.
pub struct IdentitySerde<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> IdentitySerde<V> {
    pub fn new() -> Self {
        IdentitySerde {
            _value: PhantomData,
        }
    }
}

impl<V> Default for IdentitySerde<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Serde for IdentitySerde<V> {
    type Value = V;
    type Stored = V;

    fn serialize(&self, value: V) -> Result<V> {
        Ok(value)
    }

    fn deserialize(&self, stored: V) -> Result<V> {
        Ok(stored)
    }
}

/// Postcard serde with a versioned envelope.
pub struct PostcardSerde<T> {
    _value: PhantomData<fn() -> T>,
}

impl<T> PostcardSerde<T> {
    pub fn new() -> Self {
        PostcardSerde {
            _value: PhantomData,
        }
    }
}

impl<T> Default for PostcardSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> Serde for PostcardSerde<T> {
    type Value = T;
    type Stored = Vec<u8>;

    fn serialize(&self, value: T) -> Result<Vec<u8>> {
        let payload = postcard::to_allocvec(&value)
            .map_err(|e| Error::SerializationError(e.to_string()))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&CACHE_MAGIC);
        bytes.extend_from_slice(&CURRENT_SCHEMA_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    fn deserialize(&self, stored: Vec<u8>) -> Result<T> {
        let payload = open_envelope(&stored)?;
        postcard::from_bytes(payload).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}

/// Validate the envelope header and return the payload slice.
fn open_envelope(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "entry too short: {} bytes",
            bytes.len()
        )));
    }

    let (header, payload) = bytes.split_at(HEADER_LEN);
    if header[..4] != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "bad magic header: {:?}",
            &header[..4]
        )));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&header[4..]);
    let found = u32::from_le_bytes(version);
    if found != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found,
        });
    }

    Ok(payload)
}

/// JSON serde. Human-readable, larger than [`PostcardSerde`].
pub struct JsonSerde<T> {
    _value: PhantomData<fn() -> T>,
}

impl<T> JsonSerde<T> {
    pub fn new() -> Self {
        JsonSerde {
            _value: PhantomData,
        }
    }
}

impl<T> Default for JsonSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> Serde for JsonSerde<T> {
    type Value = T;
    type Stored = Vec<u8>;

    fn serialize(&self, value: T) -> Result<Vec<u8>> {
        serde_json::to_vec(&value).map_err(|e| Error::SerializationError(e.to_string()))
    }

    fn deserialize(&self, stored: Vec<u8>) -> Result<T> {
        serde_json::from_slice(&stored).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}
