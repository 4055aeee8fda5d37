//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Storage Error Enum ==
/// Failure reported by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying I/O failure (disk full, permission denied, ...)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be parsed at the storage layer
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// A record whose key cannot be recovered; `record` locates it for removal
    #[error("Unreadable record {record}: {reason}")]
    Unreadable { record: String, reason: String },

    /// Backing store is missing or cannot be used
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Metadata update targeted an absent or expired key
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Backend write, delete or read failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Stored bytes could not be decoded into an entry
    #[error("Corrupt entry for key {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// Invalid TTL, memory limit or configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Value could not be converted to or from its JSON form
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cache was closed and its backend released
    #[error("Cache is closed")]
    Closed,
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
