//! Entry Codec Module
//!
//! Converts entries to and from the raw bytes a backend stores.
//!
//! Layout: one format version byte followed by the JSON encoding of the entry.

use crate::cache::Entry;
use crate::error::{CacheError, Result};

/// Current on-storage format version.
pub const CODEC_VERSION: u8 = 1;

// == Entry Codec ==
/// Stateless encoder/decoder for [`Entry`] records.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryCodec;

impl EntryCodec {
    // == Encode ==
    /// Encodes an entry into its stored form.
    pub fn encode(entry: &Entry) -> Result<Vec<u8>> {
        let mut bytes = vec![CODEC_VERSION];
        serde_json::to_writer(&mut bytes, entry)?;
        Ok(bytes)
    }

    // == Decode ==
    /// Decodes stored bytes for `key`.
    ///
    /// Any malformed input fails with [`CacheError::CorruptEntry`].
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Entry> {
        let corrupt = |reason: String| CacheError::CorruptEntry {
            key: key.to_string(),
            reason,
        };

        let (version, body) = bytes
            .split_first()
            .ok_or_else(|| corrupt("empty record".to_string()))?;

        if *version != CODEC_VERSION {
            return Err(corrupt(format!("unsupported format version {}", version)));
        }

        let entry: Entry = serde_json::from_slice(body).map_err(|e| corrupt(e.to_string()))?;

        if entry.key != key {
            return Err(corrupt(format!("record belongs to key {}", entry.key)));
        }

        Ok(entry)
    }
}
