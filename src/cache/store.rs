//! Cache Store Module
//!
//! Single-threaded cache engine: writes through a [`Backend`] while keeping the
//! tag index, recency order and size accounting in step with it.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backend::{Backend, MemoryBackend};
use crate::cache::entry::{expiry_from, is_past, seconds_until};
use crate::cache::{
    CacheStats, Entry, EntryCodec, LruTracker, SizeAccountant, TagIndex, BYTES_PER_MB,
};
use crate::error::{CacheError, Result, StorageError};

// == Key TTL ==
/// Remaining lifetime of a key as reported by [`CacheStore::get_ttl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key is absent or already expired
    Missing,
    /// Key never expires
    Persistent,
    /// Whole seconds left, rounded up
    Remaining(u64),
}

/// Per-key metadata mirrored from the backend.
#[derive(Debug, Clone)]
struct EntryMeta {
    expires_at: Option<DateTime<Utc>>,
    size_bytes: u64,
}

impl EntryMeta {
    fn is_expired(&self) -> bool {
        is_past(self.expires_at)
    }
}

// == Cache Store ==
/// Main cache engine with TTL, tags and LRU eviction under a memory limit.
pub struct CacheStore {
    /// Record storage
    backend: Box<dyn Backend>,
    /// Expiry and size of every stored entry, expired ones included
    meta: HashMap<String, EntryMeta>,
    /// Tag <-> key index
    tags: TagIndex,
    /// LRU access tracker
    lru: LruTracker,
    /// Memory usage and limit
    accountant: SizeAccountant,
    /// Performance statistics
    stats: CacheStats,
    /// Default TTL in seconds for entries without explicit TTL
    default_ttl: Option<u64>,
    /// Set once the backend has been released
    closed: bool,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an ephemeral store backed by a [`MemoryBackend`].
    pub fn new() -> Self {
        Self::from_parts(Box::new(MemoryBackend::new()))
    }

    fn from_parts(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            meta: HashMap::new(),
            tags: TagIndex::new(),
            lru: LruTracker::new(),
            accountant: SizeAccountant::new(None),
            stats: CacheStats::new(),
            default_ttl: None,
            closed: false,
        }
    }

    /// Attaches to `backend`, rebuilding the index from whatever it already holds.
    pub fn with_backend(mut backend: Box<dyn Backend>) -> Result<Self> {
        backend.on_open()?;

        let mut store = Self::from_parts(backend);
        store.recover()?;
        Ok(store)
    }

    // == Recover ==
    /// Full rescan of the backend. Only run when attaching to existing storage.
    fn recover(&mut self) -> Result<()> {
        let mut keys = Vec::new();
        let mut unreadable = Vec::new();
        for key in self.backend.keys()? {
            match key {
                Ok(key) => keys.push(key),
                Err(StorageError::Unreadable { record, reason }) => {
                    warn!("Discarding unreadable record {}: {}", record, reason);
                    self.stats.record_corrupt();
                    unreadable.push(record);
                }
                Err(StorageError::Malformed(reason)) => {
                    warn!("Skipping unreadable record during recovery: {}", reason);
                    self.stats.record_corrupt();
                }
                Err(e) => return Err(e.into()),
            }
        }
        for record in &unreadable {
            self.backend.discard_unreadable(record)?;
        }

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.load(&key)? {
                entries.push(entry);
            }
        }

        // Oldest writes become the first eviction candidates
        entries.sort_by_key(|entry| entry.created_at);
        for entry in &entries {
            self.register(entry);
        }

        if !entries.is_empty() {
            info!(
                "Recovered {} entries ({} bytes) from storage",
                entries.len(),
                self.accountant.total()
            );
        }
        Ok(())
    }

    // == Configuration ==
    /// Sets the TTL applied to later writes that do not specify one.
    pub fn set_default_ttl(&mut self, ttl: Option<u64>) {
        self.default_ttl = ttl;
    }

    pub fn default_ttl(&self) -> Option<u64> {
        self.default_ttl
    }

    /// Sets the memory ceiling in megabytes. Enforced on the next write.
    pub fn set_max_memory_usage(&mut self, megabytes: Option<u64>) -> Result<()> {
        let bytes = match megabytes {
            Some(mb) => Some(mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
                CacheError::Config(format!("Memory limit of {} MB is out of range", mb))
            })?),
            None => None,
        };
        self.set_max_memory_bytes(bytes)
    }

    /// Sets the memory ceiling in bytes. Enforced on the next write.
    pub fn set_max_memory_bytes(&mut self, bytes: Option<u64>) -> Result<()> {
        if bytes == Some(0) {
            return Err(CacheError::Config(
                "Memory limit must be greater than zero".to_string(),
            ));
        }
        self.accountant.set_limit(bytes);
        Ok(())
    }

    // == Set ==
    /// Stores a value, replacing any existing entry for the key.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL in seconds (uses default_ttl if None)
    /// * `tags` - Tags for the entry; replaces the previous entry's tags
    ///
    /// Returns `Ok` once the entry is stored. Failing to remove an eviction
    /// victim is logged and leaves usage over the limit until a later write.
    pub fn set(
        &mut self,
        key: String,
        value: serde_json::Value,
        ttl: Option<u64>,
        tags: BTreeSet<String>,
    ) -> Result<()> {
        self.ensure_open()?;

        let entry = Entry::new(key, value, ttl.or(self.default_ttl), tags)?;
        self.backend.put(&entry.key, EntryCodec::encode(&entry)?)?;

        self.forget(&entry.key);
        self.register(&entry);

        self.evict_over_budget(&entry.key);
        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are reaped and reported as misses. A corrupt record is
    /// logged, removed and also reported as a miss.
    pub fn get(&mut self, key: &str) -> Result<Option<serde_json::Value>> {
        self.ensure_open()?;

        let expired = match self.meta.get(key) {
            Some(meta) => meta.is_expired(),
            None => {
                self.stats.record_miss();
                return Ok(None);
            }
        };

        if expired {
            self.reap(key)?;
            self.stats.record_miss();
            return Ok(None);
        }

        match self.load(key)? {
            Some(entry) => {
                self.stats.record_hit();
                self.lru.touch(key);
                Ok(Some(entry.value))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    // == Set TTL ==
    /// Replaces the expiry of a live entry. `None` makes it persistent.
    pub fn set_ttl(&mut self, key: &str, ttl: Option<u64>) -> Result<()> {
        self.ensure_open()?;

        let mut entry = self.live_entry(key)?;
        entry.expires_at = expiry_from(Utc::now(), ttl)?;
        self.backend.put(key, EntryCodec::encode(&entry)?)?;

        if let Some(meta) = self.meta.get_mut(key) {
            meta.expires_at = entry.expires_at;
        }
        Ok(())
    }

    // == Set Tags ==
    /// Replaces the tag set of a live entry.
    pub fn set_tags(&mut self, key: &str, tags: BTreeSet<String>) -> Result<()> {
        self.ensure_open()?;

        let mut entry = self.live_entry(key)?;
        let old_size = entry.size_bytes;
        entry.retag(tags);
        self.backend.put(key, EntryCodec::encode(&entry)?)?;

        self.tags.replace_tags(key, &entry.tags);
        self.accountant.replace(old_size, entry.size_bytes);
        if let Some(meta) = self.meta.get_mut(key) {
            meta.size_bytes = entry.size_bytes;
        }

        // Tags count towards the size, so a retag can push usage over the limit
        self.evict_over_budget(key);
        Ok(())
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether an entry was removed.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.remove(key)?.is_some())
    }

    // == Delete Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn delete_expired(&mut self) -> Result<usize> {
        self.ensure_open()?;

        let expired_keys: Vec<String> = self
            .meta
            .iter()
            .filter(|(_, meta)| meta.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.reap(key)?;
        }

        Ok(expired_keys.len())
    }

    // == Clear ==
    /// Removes every entry and resets the accounting.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_open()?;

        self.backend.clear()?;
        self.meta.clear();
        self.tags.clear();
        self.lru.clear();
        self.accountant.reset();

        info!("Cache cleared");
        Ok(())
    }

    // == Tags ==
    /// Live keys carrying `tag`.
    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.tags
            .keys_for_tag(tag)
            .into_iter()
            .filter(|key| self.has(key))
            .collect()
    }

    /// Tags of a live entry; empty for absent or expired keys.
    pub fn tags_for_key(&self, key: &str) -> Vec<String> {
        if !self.has(key) {
            return Vec::new();
        }
        self.tags.tags_for_key(key).into_iter().collect()
    }

    /// Values of live entries carrying any of `tags`, ordered by key.
    pub fn get_tagged(&mut self, tags: &BTreeSet<String>) -> Result<Vec<serde_json::Value>> {
        self.ensure_open()?;

        let keys: BTreeSet<String> = tags
            .iter()
            .flat_map(|tag| self.tags.keys_for_tag(tag))
            .filter(|key| self.has(key))
            .collect();

        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.load(&key)? {
                self.lru.touch(&key);
                values.push(entry.value);
            }
        }
        Ok(values)
    }

    /// Removes every entry carrying `tag`. Returns how many live entries were
    /// removed; expired ones are reaped alongside without being counted.
    pub fn delete_tag(&mut self, tag: &str) -> Result<usize> {
        self.ensure_open()?;

        let mut invalidated = 0;
        for key in self.tags.keys_for_tag(tag) {
            if self.has(&key) {
                self.remove(&key)?;
                invalidated += 1;
            } else {
                self.reap(&key)?;
            }
        }

        if invalidated > 0 {
            info!("Invalidated {} entries tagged {:?}", invalidated, tag);
        }
        Ok(invalidated)
    }

    // == Introspection ==
    /// Checks that `key` holds a live entry without touching recency.
    pub fn has(&self, key: &str) -> bool {
        self.meta.get(key).is_some_and(|meta| !meta.is_expired())
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .meta
            .iter()
            .filter(|(_, meta)| !meta.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Remaining lifetime of `key`. Reaps the entry if it has expired.
    pub fn get_ttl(&mut self, key: &str) -> Result<KeyTtl> {
        self.ensure_open()?;

        let (expired, expires_at) = match self.meta.get(key) {
            Some(meta) => (meta.is_expired(), meta.expires_at),
            None => return Ok(KeyTtl::Missing),
        };

        if expired {
            self.reap(key)?;
            return Ok(KeyTtl::Missing);
        }

        Ok(match expires_at {
            Some(expires_at) => KeyTtl::Remaining(seconds_until(expires_at)),
            None => KeyTtl::Persistent,
        })
    }

    /// Current memory usage in bytes.
    pub fn get_size(&self) -> u64 {
        self.accountant.total()
    }

    /// Configured memory ceiling in bytes.
    pub fn max_memory(&self) -> Option<u64> {
        self.accountant.limit()
    }

    /// Number of live (non-expired) entries.
    pub fn get_count(&self) -> usize {
        self.meta.values().filter(|meta| !meta.is_expired()).count()
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.meta.len(),
            tag_count: self.tags.tag_count(),
            memory_used: self.accountant.total(),
            memory_limit: self.accountant.limit(),
            ..self.stats.clone()
        }
    }

    pub fn is_durable(&self) -> bool {
        self.backend.is_durable()
    }

    // == Close ==
    /// Flushes and releases the backend. Later operations fail with `Closed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.backend.flush()?;
        self.backend.on_close()?;
        debug!("Cache store closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // == Internals ==
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    /// Adds a freshly written entry to the index, accountant and LRU.
    fn register(&mut self, entry: &Entry) {
        self.meta.insert(
            entry.key.clone(),
            EntryMeta {
                expires_at: entry.expires_at,
                size_bytes: entry.size_bytes,
            },
        );
        self.tags.add_tags(&entry.key, &entry.tags);
        self.accountant.add(entry.size_bytes);
        self.lru.touch(&entry.key);
    }

    /// Drops a key from the index, accountant and LRU. Backend untouched.
    fn forget(&mut self, key: &str) -> Option<EntryMeta> {
        self.tags.remove_key(key);
        self.lru.remove(key);

        let meta = self.meta.remove(key)?;
        self.accountant.remove(meta.size_bytes);
        Some(meta)
    }

    /// Shared removal path for delete, reap, eviction and invalidation.
    fn remove(&mut self, key: &str) -> Result<Option<EntryMeta>> {
        self.backend.delete(key)?;
        Ok(self.forget(key))
    }

    fn reap(&mut self, key: &str) -> Result<()> {
        if self.remove(key)?.is_some() {
            self.stats.record_expiration();
            debug!("Reaped expired key {}", key);
        }
        Ok(())
    }

    /// Reads and decodes a stored entry.
    ///
    /// Corrupt or vanished records are logged, removed from the index and
    /// reported as `None`.
    fn load(&mut self, key: &str) -> Result<Option<Entry>> {
        let bytes = match self.backend.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                if self.forget(key).is_some() {
                    warn!("Record for key {} vanished from storage", key);
                }
                return Ok(None);
            }
            Err(StorageError::Malformed(reason)) => {
                self.discard_corrupt(key, &reason)?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match EntryCodec::decode(key, &bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(CacheError::CorruptEntry { reason, .. }) => {
                self.discard_corrupt(key, &reason)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn discard_corrupt(&mut self, key: &str, reason: &str) -> Result<()> {
        warn!("Discarding corrupt entry for key {}: {}", key, reason);
        self.stats.record_corrupt();
        self.remove(key)?;
        Ok(())
    }

    /// Fetches a live entry for a metadata update, reaping it if expired.
    fn live_entry(&mut self, key: &str) -> Result<Entry> {
        let expired = match self.meta.get(key) {
            Some(meta) => meta.is_expired(),
            None => return Err(CacheError::KeyNotFound(key.to_string())),
        };

        if expired {
            self.reap(key)?;
            return Err(CacheError::KeyNotFound(key.to_string()));
        }

        self.load(key)?
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))
    }

    // == Evict Over Budget ==
    /// Removes least recently used entries other than `protected` until usage
    /// is within the limit or nothing else is left to remove.
    ///
    /// A victim that cannot be removed ends the pass with a warning.
    fn evict_over_budget(&mut self, protected: &str) {
        while self.accountant.is_over_budget() {
            let Some(victim) = self.lru.oldest_except(protected).cloned() else {
                warn!(
                    "Memory usage of {} bytes exceeds the limit of {:?} bytes \
                     with nothing left to evict",
                    self.accountant.total(),
                    self.accountant.limit()
                );
                break;
            };

            let expired = self.meta.get(&victim).is_some_and(EntryMeta::is_expired);
            if let Err(e) = self.remove(&victim) {
                warn!("Failed to evict key {}: {}", victim, e);
                break;
            }

            if expired {
                self.stats.record_expiration();
            } else {
                self.stats.record_eviction();
                debug!("Evicted key {} to satisfy memory limit", victim);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn index_is_consistent(&self) -> bool {
        let sizes: u64 = self.meta.values().map(|meta| meta.size_bytes).sum();
        self.tags.is_symmetric()
            && self.tags.indexed_keys().all(|key| self.meta.contains_key(key))
            && self.lru.len() == self.meta.len()
            && sizes == self.accountant.total()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close cache backend: {}", e);
        }
    }
}
