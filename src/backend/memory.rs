//! In-process storage backend

use std::collections::HashMap;

use super::{Backend, KeyIter};
use crate::error::StorageError;

/// Ephemeral backend holding records in a HashMap.
///
/// Contents are lost when the backend is dropped.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: HashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Backend for MemoryBackend {
    fn put(&mut self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.records.insert(key.to_string(), bytes);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.records.get(key).cloned())
    }

    fn delete(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.records.remove(key).is_some())
    }

    fn keys(&self) -> Result<KeyIter<'_>, StorageError> {
        Ok(Box::new(self.records.keys().cloned().map(Ok)))
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.records.clear();
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
