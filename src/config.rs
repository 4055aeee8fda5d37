//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL in seconds for entries without explicit TTL, None = never expire
    pub default_ttl: Option<u64>,
    /// Memory limit in megabytes, None = unbounded
    pub max_memory_mb: Option<u64>,
    /// Directory for the disk store, None = in-memory only
    pub cache_dir: Option<PathBuf>,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: none)
    /// - `CACHE_MAX_MEMORY_MB` - Memory limit in megabytes (default: none)
    /// - `CACHE_DIR` - Disk store directory (default: in-memory)
    /// - `CACHE_CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    ///
    /// Unset or empty variables fall back to defaults; malformed values are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            default_ttl: parse_var(&lookup, "CACHE_DEFAULT_TTL")?,
            max_memory_mb: parse_var(&lookup, "CACHE_MAX_MEMORY_MB")?,
            cache_dir: lookup("CACHE_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            cleanup_interval: parse_var(&lookup, "CACHE_CLEANUP_INTERVAL")?
                .unwrap_or(defaults.cleanup_interval),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the cache cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_mb == Some(0) {
            return Err(CacheError::Config(
                "CACHE_MAX_MEMORY_MB must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval == 0 {
            return Err(CacheError::Config(
                "CACHE_CLEANUP_INTERVAL must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    /// Builds the configured cache, opening the disk store when a directory is set.
    pub fn build(&self) -> Result<Cache> {
        self.validate()?;

        let cache = match &self.cache_dir {
            Some(dir) => Cache::open_disk(dir)?,
            None => Cache::new(),
        };
        cache.set_default_ttl(self.default_ttl);
        cache.set_max_memory_usage(self.max_memory_mb)?;
        Ok(cache)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: None,
            max_memory_mb: None,
            cache_dir: None,
            cleanup_interval: 60,
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| CacheError::Config(format!("{}={:?}: {}", name, raw, e))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, None);
        assert_eq!(config.max_memory_mb, None);
        assert_eq!(config.cache_dir, None);
        assert_eq!(config.cleanup_interval, 60);
    }

    #[test]
    fn test_config_from_empty_environment() {
        let config = CacheConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("CACHE_DEFAULT_TTL", "300"),
            ("CACHE_MAX_MEMORY_MB", " 16 "),
            ("CACHE_DIR", "/var/cache/app"),
            ("CACHE_CLEANUP_INTERVAL", "5"),
        ]))
        .unwrap();

        assert_eq!(config.default_ttl, Some(300));
        assert_eq!(config.max_memory_mb, Some(16));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/app")));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_malformed_value() {
        let result = CacheConfig::from_lookup(lookup_from(&[("CACHE_DEFAULT_TTL", "-5")]));

        let err = result.unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
        assert!(err.to_string().contains("CACHE_DEFAULT_TTL"));
    }

    #[test]
    fn test_config_zero_memory_rejected() {
        let result = CacheConfig::from_lookup(lookup_from(&[("CACHE_MAX_MEMORY_MB", "0")]));
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_config_build_in_memory() {
        let config = CacheConfig {
            default_ttl: Some(30),
            max_memory_mb: Some(1),
            ..CacheConfig::default()
        };

        let cache = config.build().unwrap();

        assert!(!cache.is_durable());
        assert_eq!(cache.default_ttl(), Some(30));
        assert_eq!(cache.max_memory(), Some(1024 * 1024));
    }

    #[test]
    fn test_config_build_on_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = CacheConfig {
            cache_dir: Some(tmp.path().to_path_buf()),
            ..CacheConfig::default()
        };

        let cache = config.build().unwrap();
        assert!(cache.is_durable());
    }
}
