//! Storage Backend Module
//!
//! Key -> raw bytes stores the cache engine writes through. Backends know
//! nothing about TTLs, tags or sizes; those live in the engine.

mod disk;
mod memory;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;

use crate::error::StorageError;

/// Lazy walk over the keys a backend holds.
pub type KeyIter<'a> = Box<dyn Iterator<Item = Result<String, StorageError>> + 'a>;

/// Storage backend trait
///
/// Implementations store opaque records addressed by key. The engine
/// serializes every call, so implementations need not be internally synchronized.
pub trait Backend: Send {
    /// Store `bytes` under `key`, replacing any previous record
    fn put(&mut self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Read the record for `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove the record for `key`, returning whether one existed
    fn delete(&mut self, key: &str) -> Result<bool, StorageError>;

    /// Walk all stored keys. Each call starts a fresh walk.
    fn keys(&self) -> Result<KeyIter<'_>, StorageError>;

    /// Remove every record
    fn clear(&mut self) -> Result<(), StorageError>;

    /// Make completed writes visible to a later open
    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Called once when a cache attaches to the backend
    fn on_open(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Remove a record reported as [`StorageError::Unreadable`] by `keys`
    ///
    /// `record` is the locator carried by that error. Backends whose keys are
    /// always readable never report one, so the default does nothing.
    fn discard_unreadable(&mut self, record: &str) -> Result<(), StorageError> {
        let _ = record;
        Ok(())
    }

    /// Called once when the cache is closed
    fn on_close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Whether records survive the process
    fn is_durable(&self) -> bool;
}
