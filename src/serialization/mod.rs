//! Postcard payloads inside a versioned envelope.
//!
//! Every cached value is stored as:
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "AVCH"
//! ```
//!
//! A decode failure of any kind (bad magic, version drift, truncated payload)
//! is reported as an error the accessor recognises via
//! [`Error::is_corrupt_entry`](crate::Error::is_corrupt_entry): the key is
//! evicted and the value recomputed. Entries are never migrated in place.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header identifying entries written by this crate.
pub const CACHE_MAGIC: [u8; 4] = *b"AVCH";

/// Current payload schema version.
///
/// Bump when a cached type changes shape (fields added, removed, reordered or
/// retyped). Old entries then fail to decode and are recomputed.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around a cached payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    pub magic: [u8; 4],
    pub version: u32,
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encode a value for storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if postcard rejects the value.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(&CacheEnvelope::new(value)).map_err(|e| {
        error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode a stored value, validating magic and schema version.
///
/// # Errors
///
/// - `Error::DeserializationError`: truncated or malformed bytes
/// - `Error::InvalidCacheEntry`: foreign data under our key
/// - `Error::VersionMismatch`: written by another schema version
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes)
        .map_err(|e| Error::DeserializationError(e.to_string()))?;

    if envelope.magic != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}
