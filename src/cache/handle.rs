//! Cache Handle Module
//!
//! Cloneable, thread-safe façade over a [`CacheStore`].

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::backend::{Backend, DiskBackend};
use crate::cache::{CacheStats, CacheStore, KeyTtl};
use crate::error::{CacheError, Result};

// == Set Options ==
/// TTL and tags for a write made with [`Cache::set_with`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    ttl: Option<u64>,
    tags: BTreeSet<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire the entry after `seconds`. Without it the cache default applies.
    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

fn tag_set<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter().map(Into::into).collect()
}

// == Cache ==
/// Shared handle to a cache.
///
/// Cloning is cheap and every clone sees the same entries. Each operation
/// holds one lock for its whole duration, so the backend, tag index and size
/// accounting are always observed in step.
///
/// ```
/// use tagcache::{Cache, SetOptions};
///
/// let cache = Cache::new();
/// cache.set_with("user:1", &"Ann", SetOptions::new().ttl(60).tag("users"))?;
///
/// assert_eq!(cache.get::<String>("user:1")?, Some("Ann".to_string()));
/// assert_eq!(cache.keys_for_tag("users"), vec!["user:1"]);
/// # Ok::<(), tagcache::CacheError>(())
/// ```
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Mutex<CacheStore>>,
}

impl Cache {
    // == Constructors ==
    /// Ephemeral in-memory cache.
    pub fn new() -> Self {
        Self::from_store(CacheStore::new())
    }

    /// Cache over any backend; entries already stored there are recovered.
    pub fn with_backend(backend: Box<dyn Backend>) -> Result<Self> {
        let store = CacheStore::with_backend(backend)?;
        info!(
            "Cache attached to {} backend with {} live entries",
            if store.is_durable() { "durable" } else { "ephemeral" },
            store.get_count()
        );
        Ok(Self::from_store(store))
    }

    /// Durable cache stored under `path`.
    pub fn open_disk(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_backend(Box::new(DiskBackend::open(path)?))
    }

    /// Durable cache at [`DiskBackend::default_path`].
    pub fn open_default_disk() -> Result<Self> {
        Self::with_backend(Box::new(DiskBackend::open_default()?))
    }

    fn from_store(store: CacheStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheStore> {
        // Every operation leaves the store consistent before it can panic
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // == Configuration ==
    pub fn set_default_ttl(&self, seconds: Option<u64>) {
        self.lock().set_default_ttl(seconds);
    }

    pub fn default_ttl(&self) -> Option<u64> {
        self.lock().default_ttl()
    }

    /// Memory ceiling in megabytes; `None` removes it.
    pub fn set_max_memory_usage(&self, megabytes: Option<u64>) -> Result<()> {
        self.lock().set_max_memory_usage(megabytes)
    }

    /// Memory ceiling in bytes; `None` removes it.
    pub fn set_max_memory_bytes(&self, bytes: Option<u64>) -> Result<()> {
        self.lock().set_max_memory_bytes(bytes)
    }

    // == Writes ==
    /// Stores `value` with the default TTL and no tags.
    pub fn set<V>(&self, key: impl Into<String>, value: &V) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        self.set_with(key, value, SetOptions::new())
    }

    /// Stores `value` expiring after `ttl` seconds (`None` = default TTL).
    pub fn set_with_ttl<V>(&self, key: impl Into<String>, value: &V, ttl: Option<u64>) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        let options = SetOptions {
            ttl,
            ..SetOptions::new()
        };
        self.set_with(key, value, options)
    }

    /// Stores `value` with explicit TTL and tags.
    pub fn set_with<V>(&self, key: impl Into<String>, value: &V, options: SetOptions) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.lock().set(key.into(), value, options.ttl, options.tags)
    }

    /// Replaces the TTL of a live key (`None` = never expires).
    pub fn set_ttl(&self, key: &str, seconds: Option<u64>) -> Result<()> {
        self.lock().set_ttl(key, seconds)
    }

    /// Replaces the tags of a live key.
    pub fn set_tags<I, S>(&self, key: &str, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().set_tags(key, tag_set(tags))
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        self.lock().delete(key)
    }

    pub fn delete_expired(&self) -> Result<usize> {
        self.lock().delete_expired()
    }

    /// Removes every entry carrying `tag`.
    pub fn delete_tag(&self, tag: &str) -> Result<usize> {
        self.lock().delete_tag(tag)
    }

    pub fn clear(&self) -> Result<()> {
        self.lock().clear()
    }

    // == Reads ==
    /// Value for `key`, or `None` on a miss.
    pub fn get<V>(&self, key: &str) -> Result<Option<V>>
    where
        V: DeserializeOwned,
    {
        let value = self.lock().get(key)?;
        Ok(value.map(serde_json::from_value).transpose()?)
    }

    /// Value for `key`, or `default` on a miss.
    pub fn get_or<V>(&self, key: &str, default: V) -> Result<V>
    where
        V: DeserializeOwned,
    {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Values of live entries carrying any of `tags`, ordered by key.
    pub fn get_tagged<V, I, S>(&self, tags: I) -> Result<Vec<V>>
    where
        V: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = self.lock().get_tagged(&tag_set(tags))?;
        values
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(CacheError::from))
            .collect()
    }

    pub fn has(&self, key: &str) -> bool {
        self.lock().has(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys()
    }

    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.lock().keys_for_tag(tag)
    }

    pub fn tags_for_key(&self, key: &str) -> Vec<String> {
        self.lock().tags_for_key(key)
    }

    pub fn get_ttl(&self, key: &str) -> Result<KeyTtl> {
        self.lock().get_ttl(key)
    }

    /// Current memory usage in bytes.
    pub fn get_size(&self) -> u64 {
        self.lock().get_size()
    }

    /// Configured memory ceiling in bytes.
    pub fn max_memory(&self) -> Option<u64> {
        self.lock().max_memory()
    }

    /// Number of live entries.
    pub fn get_count(&self) -> usize {
        self.lock().get_count()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn is_durable(&self) -> bool {
        self.lock().is_durable()
    }

    // == Close ==
    /// Flushes and releases the backend for every clone of this handle.
    pub fn close(&self) -> Result<()> {
        self.lock().close()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}
