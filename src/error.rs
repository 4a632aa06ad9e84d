//! Error types for cache operations.

use std::fmt;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the cache contract and its collaborators.
///
/// A cache miss is never an error: missing keys are simply absent from
/// the returned mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Value could not be encoded for storage.
    SerializationError(String),

    /// Stored bytes could not be decoded back into a value.
    DeserializationError(String),

    /// Stored entry has a bad magic header or a truncated envelope.
    InvalidCacheEntry(String),

    /// Stored entry was written with a different schema version.
    VersionMismatch { expected: u32, found: u32 },

    /// Backend failed to serve the request.
    BackendError(String),

    /// Invalid configuration.
    ConfigError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => write!(
                f,
                "Cache schema version mismatch: expected {}, found {}",
                expected, found
            ),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
