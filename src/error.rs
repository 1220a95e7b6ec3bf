//! Error types for the cache layer.
//!
//! These errors never leave the crate through a read or invalidation
//! operation: the accessor and the orchestrator log them and degrade. They
//! are public so the store client can be used directly for maintenance.

use std::fmt;

/// Result type for store and codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// Encoding a value into cache bytes failed.
    SerializationError(String),

    /// Decoding cache bytes failed.
    ///
    /// **Recovery:** the entry is evicted and the value recomputed.
    DeserializationError(String),

    /// The envelope header is not ours (bad magic).
    InvalidCacheEntry(String),

    /// The entry was written by a different payload schema version.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// The key-value store returned an error or is unreachable.
    ///
    /// Common causes:
    /// - Connection lost or refused
    /// - Pool exhausted
    /// - Protocol error
    BackendError(String),

    /// A store round trip exceeded the per-call timeout.
    Timeout(String),

    /// Invalid connection settings.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Whether this error means the stored bytes are unusable and the key
    /// should be evicted.
    pub fn is_corrupt_entry(&self) -> bool {
        matches!(
            self,
            Error::DeserializationError(_)
                | Error::InvalidCacheEntry(_)
                | Error::VersionMismatch { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}
