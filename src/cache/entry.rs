//! Cache Entry Module
//!
//! Defines the unit of cached data: a JSON value plus TTL, tag and size metadata.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::ENTRY_OVERHEAD;
use crate::error::{CacheError, Result};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Key the entry is stored under
    pub key: String,
    /// The stored value
    pub value: serde_json::Value,
    /// Write timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp, None = no expiration
    pub expires_at: Option<DateTime<Utc>>,
    /// Labels used for grouped lookup and invalidation
    pub tags: BTreeSet<String>,
    /// Size estimate fixed at write time
    pub size_bytes: u64,
}

impl Entry {
    // == Constructor ==
    /// Creates a new entry expiring `ttl_seconds` from now.
    ///
    /// # Arguments
    /// * `key` - Key the entry is stored under
    /// * `value` - The value to store
    /// * `ttl_seconds` - Optional TTL in seconds, None = never expires
    /// * `tags` - Tags attached to the entry
    pub fn new(
        key: String,
        value: serde_json::Value,
        ttl_seconds: Option<u64>,
        tags: BTreeSet<String>,
    ) -> Result<Self> {
        let now = Utc::now();
        let expires_at = expiry_from(now, ttl_seconds)?;
        let size_bytes = estimate_size(&key, &value, &tags);

        Ok(Self {
            key,
            value,
            created_at: now,
            expires_at,
            tags,
            size_bytes,
        })
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiration time.
    pub fn is_expired(&self) -> bool {
        is_past(self.expires_at)
    }

    /// Replaces the tag set and recomputes the size estimate.
    pub fn retag(&mut self, tags: BTreeSet<String>) {
        self.tags = tags;
        self.size_bytes = estimate_size(&self.key, &self.value, &self.tags);
    }
}

// == Utility Functions ==
/// Computes the expiration timestamp for a TTL starting at `now`.
///
/// Fails with a configuration error when the TTL does not fit the timestamp range.
pub fn expiry_from(now: DateTime<Utc>, ttl_seconds: Option<u64>) -> Result<Option<DateTime<Utc>>> {
    let Some(ttl) = ttl_seconds else {
        return Ok(None);
    };

    i64::try_from(ttl)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .map(Some)
        .ok_or_else(|| CacheError::Config(format!("TTL of {} seconds is out of range", ttl)))
}

/// Returns true if the timestamp is set and not in the future.
pub fn is_past(expires_at: Option<DateTime<Utc>>) -> bool {
    match expires_at {
        Some(expires) => Utc::now() >= expires,
        None => false,
    }
}

/// Remaining whole seconds until `expires_at`, rounded up; 0 once expired.
pub fn seconds_until(expires_at: DateTime<Utc>) -> u64 {
    let ms = (expires_at - Utc::now()).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        (ms as u64).div_ceil(1000)
    }
}

/// Size estimate of an entry: key, JSON value and tag bytes plus fixed overhead.
pub fn estimate_size(key: &str, value: &serde_json::Value, tags: &BTreeSet<String>) -> u64 {
    let value_len = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0);
    let tags_len: usize = tags.iter().map(String::len).sum();
    (key.len() + value_len + tags_len) as u64 + ENTRY_OVERHEAD
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = Entry::new("k".to_string(), json!("v"), None, BTreeSet::new()).unwrap();

        assert_eq!(entry.value, json!("v"));
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = Entry::new("k".to_string(), json!(1), Some(60), BTreeSet::new()).unwrap();

        assert!(entry.expires_at.is_some());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_zero_ttl_is_already_expired() {
        let entry = Entry::new("k".to_string(), json!(1), Some(0), BTreeSet::new()).unwrap();
        assert!(entry.is_expired());
    }

    #[test]
    fn test_ttl_out_of_range() {
        let result = Entry::new("k".to_string(), json!(1), Some(u64::MAX), BTreeSet::new());
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_size_estimate() {
        let entry =
            Entry::new("key".to_string(), json!("abc"), None, tags(&["t1", "tag2"])).unwrap();

        // "key" + "\"abc\"" + "t1" + "tag2"
        assert_eq!(entry.size_bytes, 3 + 5 + 2 + 4 + ENTRY_OVERHEAD);
    }

    #[test]
    fn test_retag_updates_size() {
        let mut entry = Entry::new("key".to_string(), json!(null), None, BTreeSet::new()).unwrap();
        let before = entry.size_bytes;

        entry.retag(tags(&["abcdef"]));

        assert_eq!(entry.size_bytes, before + 6);
    }

    #[test]
    fn test_seconds_until_rounds_up() {
        let now = Utc::now();
        let expires = expiry_from(now, Some(120)).unwrap().unwrap();

        let remaining = seconds_until(expires);
        assert!(remaining <= 120);
        assert!(remaining >= 119);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        assert!(is_past(Some(Utc::now())), "Entry should be expired at boundary");
        assert!(!is_past(None));
    }
}
