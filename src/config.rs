//! Configuration Module
//!
//! Size and TTL policy for the cache, loadable from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default blob residency (blobs are content-addressed and costly to refetch)
pub const DEFAULT_BLOB_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default period of the background maintenance pass
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// Default entry count above which the index is compacted
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 10_000;
/// Default number of prior digests remembered per tag
pub const DEFAULT_TAG_HISTORY_LIMIT: usize = 10;

/// Cache configuration parameters.
///
/// `max_size_bytes` and `default_ttl` are required. For the remaining fields
/// a zero value means "unset" and is replaced by [`Config::set_defaults`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Global size budget across all indexed payloads, in bytes
    pub max_size_bytes: u64,
    /// TTL applied to manifests and tag mappings
    pub default_ttl: Duration,
    /// TTL applied to blobs
    pub blob_ttl: Duration,
    /// Interval between background maintenance passes
    pub maintenance_interval: Duration,
    /// Index entry count that triggers compaction
    pub compaction_threshold: usize,
    /// Number of prior digests kept per tag
    pub tag_history_limit: usize,
    /// HTTP port used by the binary
    pub server_port: u16,
    /// Cache root used by the binary
    pub storage_root: PathBuf,
}

impl Config {
    /// Creates a config with the two required fields and everything else defaulted.
    pub fn new(max_size_bytes: u64, default_ttl: Duration) -> Self {
        Self {
            max_size_bytes,
            default_ttl,
            ..Self::default()
        }
    }

    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `OCI_CACHE_MAX_SIZE_BYTES` - Size budget (default: 1 GiB)
    /// - `OCI_CACHE_DEFAULT_TTL_SECS` - Manifest/tag TTL (default: 3600)
    /// - `OCI_CACHE_BLOB_TTL_SECS` - Blob TTL (default: 86400)
    /// - `OCI_CACHE_MAINTENANCE_INTERVAL_SECS` - Maintenance period (default: 1800)
    /// - `OCI_CACHE_COMPACTION_THRESHOLD` - Compaction trigger (default: 10000)
    /// - `OCI_CACHE_TAG_HISTORY_LIMIT` - Tag history length (default: 10)
    /// - `OCI_CACHE_PORT` - HTTP server port (default: 5080)
    /// - `OCI_CACHE_ROOT` - Cache directory (default: ./oci-cache)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size_bytes: env_parse("OCI_CACHE_MAX_SIZE_BYTES").unwrap_or(defaults.max_size_bytes),
            default_ttl: env_parse("OCI_CACHE_DEFAULT_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            blob_ttl: env_parse("OCI_CACHE_BLOB_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.blob_ttl),
            maintenance_interval: env_parse("OCI_CACHE_MAINTENANCE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.maintenance_interval),
            compaction_threshold: env_parse("OCI_CACHE_COMPACTION_THRESHOLD")
                .unwrap_or(defaults.compaction_threshold),
            tag_history_limit: env_parse("OCI_CACHE_TAG_HISTORY_LIMIT")
                .unwrap_or(defaults.tag_history_limit),
            server_port: env_parse("OCI_CACHE_PORT").unwrap_or(defaults.server_port),
            storage_root: env::var("OCI_CACHE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
        }
    }

    // == Validate ==
    /// Rejects a zero size budget or a zero default TTL.
    pub fn validate(&self) -> Result<()> {
        if self.max_size_bytes == 0 {
            return Err(CacheError::Config(
                "max_size_bytes must be positive".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(CacheError::Config("default_ttl must be positive".to_string()));
        }
        Ok(())
    }

    // == Set Defaults ==
    /// Fills unset optional fields. Idempotent.
    pub fn set_defaults(&mut self) {
        if self.blob_ttl.is_zero() {
            self.blob_ttl = DEFAULT_BLOB_TTL;
        }
        if self.maintenance_interval.is_zero() {
            self.maintenance_interval = DEFAULT_MAINTENANCE_INTERVAL;
        }
        if self.compaction_threshold == 0 {
            self.compaction_threshold = DEFAULT_COMPACTION_THRESHOLD;
        }
        if self.tag_history_limit == 0 {
            self.tag_history_limit = DEFAULT_TAG_HISTORY_LIMIT;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_size_bytes: 1024 * 1024 * 1024,
            default_ttl: Duration::from_secs(60 * 60),
            blob_ttl: DEFAULT_BLOB_TTL,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            tag_history_limit: DEFAULT_TAG_HISTORY_LIMIT,
            server_port: 5080,
            storage_root: PathBuf::from("./oci-cache"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_size_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.blob_ttl, DEFAULT_BLOB_TTL);
        assert_eq!(config.maintenance_interval, DEFAULT_MAINTENANCE_INTERVAL);
        assert_eq!(config.compaction_threshold, 10_000);
        assert_eq!(config.server_port, 5080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        env::remove_var("OCI_CACHE_MAX_SIZE_BYTES");
        env::remove_var("OCI_CACHE_DEFAULT_TTL_SECS");
        env::remove_var("OCI_CACHE_PORT");
        env::remove_var("OCI_CACHE_MAINTENANCE_INTERVAL_SECS");

        let config = Config::from_env();
        assert_eq!(config.max_size_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.server_port, 5080);
        assert_eq!(config.maintenance_interval, DEFAULT_MAINTENANCE_INTERVAL);
    }

    #[test]
    fn test_validate_rejects_zero_size() {
        let config = Config::new(0, Duration::from_secs(60));
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = Config::new(1000, Duration::ZERO);
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_set_defaults_fills_unset_fields() {
        let mut config = Config {
            blob_ttl: Duration::ZERO,
            maintenance_interval: Duration::ZERO,
            compaction_threshold: 0,
            tag_history_limit: 0,
            ..Config::new(1000, Duration::from_secs(60))
        };
        config.set_defaults();

        assert_eq!(config.blob_ttl, DEFAULT_BLOB_TTL);
        assert_eq!(config.maintenance_interval, DEFAULT_MAINTENANCE_INTERVAL);
        assert_eq!(config.compaction_threshold, DEFAULT_COMPACTION_THRESHOLD);
        assert_eq!(config.tag_history_limit, DEFAULT_TAG_HISTORY_LIMIT);
    }

    #[test]
    fn test_set_defaults_is_idempotent() {
        let mut config = Config::new(1000, Duration::from_secs(60));
        config.maintenance_interval = Duration::from_secs(5);
        config.set_defaults();
        config.set_defaults();

        assert_eq!(config.maintenance_interval, Duration::from_secs(5));
        assert_eq!(config.max_size_bytes, 1000);
        assert_eq!(config.default_ttl, Duration::from_secs(60));
    }
}
