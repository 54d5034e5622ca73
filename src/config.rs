//! Configuration module for folderkeep.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{Result, StoreError};

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the folder tree.
    #[serde(default = "default_root")]
    pub root: String,
}

fn default_root() -> String {
    "data/files".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

/// Folder listing cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Whether the in-process listing cache is used.
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Time-to-live of a cached folder in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600 // 1 hour
}

impl CacheConfig {
    /// TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// Thumbnail configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailConfig {
    /// Maximum thumbnail width in pixels.
    #[serde(default = "default_thumb_width")]
    pub max_width: u32,
    /// Seconds before a failed generation is attempted again.
    #[serde(default = "default_thumb_retry")]
    pub retry_after_secs: u64,
}

fn default_thumb_width() -> u32 {
    320
}

fn default_thumb_retry() -> u64 {
    86400 // 1 day
}

impl ThumbnailConfig {
    /// Backoff window as a [`Duration`].
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: default_thumb_width(),
            retry_after_secs: default_thumb_retry(),
        }
    }
}

/// Password policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    /// Minimum strength score (0-4) for write passwords.
    #[serde(default = "default_min_write_score")]
    pub min_write_score: u8,
}

fn default_min_write_score() -> u8 {
    3
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_write_score: default_min_write_score(),
        }
    }
}

/// Download-to-folder configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Total request timeout in seconds.
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
    /// Allow fetching from loopback and private network addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_max_redirects() -> usize {
    5
}

fn default_download_timeout() -> u64 {
    300
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_redirects: default_max_redirects(),
            timeout_secs: default_download_timeout(),
            allow_private_hosts: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/folderkeep.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Thumbnail configuration.
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    /// Password policy.
    #[serde(default)]
    pub passwords: PasswordConfig,
    /// Download-to-folder configuration.
    #[serde(default)]
    pub download: DownloadConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FOLDERKEEP_ROOT`: Override the storage root
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("FOLDERKEEP_ROOT") {
            if !root.is_empty() {
                self.storage.root = root;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if the storage root is empty or the cache TTL is zero
    /// while the cache is enabled.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.trim().is_empty() {
            return Err(StoreError::Config("storage.root is empty".to_string()));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(StoreError::Config(
                "cache.ttl_secs must be positive while the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
