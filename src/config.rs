//! Configuration management for the streaming gateway

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for the streaming gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the HTTP adapter binds to (default: "127.0.0.1:8080")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Base URL used when generating client-facing links
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Fixed chunk size of the remote store in bytes (default: 1MB)
    /// Valid range: 64KB to 10MB
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Per-session concurrent load ceiling for round-robin selection
    /// (default: 8)
    #[serde(default = "default_load_ceiling")]
    pub load_ceiling: u32,

    /// Minimum interval between pool-wide health checks in seconds
    /// (default: 120)
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Timeout for a single health probe in seconds (default: 5)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Timeout for a single chunk fetch in seconds (default: 90).
    /// Deliberately much longer than the probe timeout; large-file
    /// streaming cannot share a liveness deadline.
    #[serde(default = "default_chunk_fetch_timeout")]
    pub chunk_fetch_timeout_secs: u64,

    /// Backoff before retrying a transient chunk failure, in milliseconds
    /// (default: 500, capped at 2000)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Object-metadata cache bounds
    #[serde(default = "default_metadata_cache")]
    pub metadata_cache: CacheClassConfig,

    /// Generated-link cache bounds
    #[serde(default = "default_link_cache")]
    pub link_cache: CacheClassConfig,

    /// User-preference cache bounds
    #[serde(default = "default_user_cache")]
    pub user_cache: CacheClassConfig,

    /// Session-token cache bounds
    #[serde(default = "default_session_cache")]
    pub session_cache: CacheClassConfig,
}

/// Bounds for one cache class
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheClassConfig {
    /// Maximum number of entries before LRU eviction
    pub max_entries: usize,
    /// Time-to-live for each entry in seconds
    pub ttl_secs: u64,
}

impl CacheClassConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// Default value functions for serde
fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_chunk_size() -> u64 {
    1024 * 1024 // 1MB
}

fn default_load_ceiling() -> u32 {
    8
}

fn default_health_check_interval() -> u64 {
    120
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_chunk_fetch_timeout() -> u64 {
    90
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_metadata_cache() -> CacheClassConfig {
    CacheClassConfig {
        max_entries: 500,
        ttl_secs: 1800, // 30 minutes
    }
}

fn default_link_cache() -> CacheClassConfig {
    CacheClassConfig {
        max_entries: 1000,
        ttl_secs: 900, // 15 minutes
    }
}

fn default_user_cache() -> CacheClassConfig {
    CacheClassConfig {
        max_entries: 200,
        ttl_secs: 3600, // 1 hour
    }
}

fn default_session_cache() -> CacheClassConfig {
    CacheClassConfig {
        max_entries: 50,
        ttl_secs: 300, // 5 minutes
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bind_address: default_bind_address(),
            base_url: default_base_url(),
            chunk_size: default_chunk_size(),
            load_ceiling: default_load_ceiling(),
            health_check_interval_secs: default_health_check_interval(),
            probe_timeout_secs: default_probe_timeout(),
            chunk_fetch_timeout_secs: default_chunk_fetch_timeout(),
            retry_backoff_ms: default_retry_backoff_ms(),
            metadata_cache: default_metadata_cache(),
            link_cache: default_link_cache(),
            user_cache: default_user_cache(),
            session_cache: default_session_cache(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Ok(GatewayConfig)` if loading and validation succeed
    /// * `Err(GatewayError)` if the file cannot be read or is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: GatewayConfig = serde_yaml::from_str(&content).map_err(|e| {
            GatewayError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - chunk_size must be between 64KB and 10MB
    /// - load_ceiling must be > 0
    /// - probe timeout must be shorter than the chunk fetch timeout
    /// - retry backoff must be <= 2000ms
    /// - every cache class must have non-zero bounds
    pub fn validate(&self) -> Result<()> {
        const MIN_CHUNK_SIZE: u64 = 64 * 1024; // 64KB
        const MAX_CHUNK_SIZE: u64 = 10 * 1024 * 1024; // 10MB
        const MAX_RETRY_BACKOFF_MS: u64 = 2000;

        if self.chunk_size < MIN_CHUNK_SIZE || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(GatewayError::ConfigError(format!(
                "chunk_size must be between {}KB and {}MB, got {} bytes",
                MIN_CHUNK_SIZE / 1024,
                MAX_CHUNK_SIZE / (1024 * 1024),
                self.chunk_size
            )));
        }

        if self.load_ceiling == 0 {
            return Err(GatewayError::ConfigError(
                "load_ceiling must be greater than 0".to_string(),
            ));
        }

        if self.probe_timeout_secs == 0 || self.chunk_fetch_timeout_secs == 0 {
            return Err(GatewayError::ConfigError(
                "probe and chunk fetch timeouts must be greater than 0".to_string(),
            ));
        }

        if self.probe_timeout_secs >= self.chunk_fetch_timeout_secs {
            return Err(GatewayError::ConfigError(format!(
                "probe_timeout_secs ({}) must be shorter than chunk_fetch_timeout_secs ({})",
                self.probe_timeout_secs, self.chunk_fetch_timeout_secs
            )));
        }

        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(GatewayError::ConfigError(format!(
                "retry_backoff_ms must be at most {}, got {}",
                MAX_RETRY_BACKOFF_MS, self.retry_backoff_ms
            )));
        }

        for (name, class) in [
            ("metadata_cache", &self.metadata_cache),
            ("link_cache", &self.link_cache),
            ("user_cache", &self.user_cache),
            ("session_cache", &self.session_cache),
        ] {
            if class.max_entries == 0 || class.ttl_secs == 0 {
                return Err(GatewayError::ConfigError(format!(
                    "{} must have non-zero max_entries and ttl_secs",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn chunk_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_fetch_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}
