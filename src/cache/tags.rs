//! Tag Index Module
//!
//! Bidirectional tag <-> key mapping kept in lockstep behind one API.

use std::collections::{BTreeSet, HashMap};

// == Tag Index ==
/// Maps each tag to its keys and each key to its tags.
///
/// Both directions are always symmetric: a key is in a tag's set iff the tag
/// is in the key's set. Empty sets are pruned from both maps.
#[derive(Debug, Default)]
pub struct TagIndex {
    by_tag: HashMap<String, BTreeSet<String>>,
    by_key: HashMap<String, BTreeSet<String>>,
}

impl TagIndex {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Add Tags ==
    /// Adds tags to a key, keeping any it already has.
    pub fn add_tags<'a, I>(&mut self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for tag in tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
            self.by_key
                .entry(key.to_string())
                .or_default()
                .insert(tag.clone());
        }
    }

    // == Replace Tags ==
    /// Drops every tag of `key` and installs the new set.
    ///
    /// Does not check that the key exists; callers guard that.
    pub fn replace_tags<'a, I>(&mut self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.remove_key(key);
        self.add_tags(key, tags);
    }

    // == Remove Key ==
    /// Removes a key from every tag set. Returns the tags it had.
    pub fn remove_key(&mut self, key: &str) -> BTreeSet<String> {
        let tags = self.by_key.remove(key).unwrap_or_default();
        for tag in &tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        tags
    }

    // == Lookups ==
    /// Keys carrying `tag`.
    pub fn keys_for_tag(&self, tag: &str) -> BTreeSet<String> {
        self.by_tag.get(tag).cloned().unwrap_or_default()
    }

    /// Tags attached to `key`.
    pub fn tags_for_key(&self, key: &str) -> BTreeSet<String> {
        self.by_key.get(key).cloned().unwrap_or_default()
    }

    /// Number of distinct tags in use.
    pub fn tag_count(&self) -> usize {
        self.by_tag.len()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.by_tag.clear();
        self.by_key.clear();
    }

    /// Checks that both directions agree.
    #[cfg(test)]
    pub fn is_symmetric(&self) -> bool {
        let forward = self
            .by_tag
            .iter()
            .all(|(tag, keys)| {
                keys.iter()
                    .all(|k| self.by_key.get(k).is_some_and(|t| t.contains(tag)))
            });
        let backward = self
            .by_key
            .iter()
            .all(|(key, tags)| {
                tags.iter()
                    .all(|t| self.by_tag.get(t).is_some_and(|k| k.contains(key)))
            });
        forward && backward
    }

    #[cfg(test)]
    pub fn indexed_keys(&self) -> impl Iterator<Item = &String> {
        self.by_key.keys()
    }
}
