//! Gateway configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (LIFEBOAT_*)
//! 2. TOML config file (if LIFEBOAT_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::PartitionNames;

mod validation;

pub use validation::ConfigError;

/// Gateway configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (LIFEBOAT_*)
/// 2. TOML config file (if LIFEBOAT_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache generation tag, e.g. "v2.0".
    ///
    /// Bumping this starts a new install/activate cycle; partitions from
    /// older tags are deleted during activation.
    #[serde(default = "default_version")]
    pub version: String,

    /// Path to the SQLite cache store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin that relative manifest entries resolve against.
    #[serde(default = "default_scope_origin")]
    pub scope_origin: String,

    /// The app shell: URLs that must be present in the static partition
    /// after install. Entries may be absolute or origin-relative paths.
    #[serde(default = "default_static_manifest")]
    pub static_manifest: Vec<String>,

    /// URL path prefix routed network-first (the dynamic/API namespace).
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// User-Agent string for network fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network fetch timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How long a stale-while-revalidate caller with no cached entry waits
    /// for the network before giving up. None means wait for the fetch
    /// timeout alone.
    #[serde(default)]
    pub swr_wait_timeout_ms: Option<u64>,

    /// Maximum bytes to accept per fetched response body.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_version() -> String {
    "v1".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./lifeboat-cache.sqlite")
}

fn default_scope_origin() -> String {
    "http://localhost:8080".into()
}

fn default_static_manifest() -> Vec<String> {
    vec!["/".into(), "/index.html".into(), "/app.js".into(), "/manifest.json".into()]
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_user_agent() -> String {
    "lifeboat/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            db_path: default_db_path(),
            scope_origin: default_scope_origin(),
            static_manifest: default_static_manifest(),
            api_prefix: default_api_prefix(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            swr_wait_timeout_ms: None,
            max_bytes: default_max_bytes(),
        }
    }
}

impl AppConfig {
    /// Fetch timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Stale-while-revalidate wait budget, if configured.
    pub fn swr_wait_timeout(&self) -> Option<Duration> {
        self.swr_wait_timeout_ms.map(Duration::from_millis)
    }

    /// Partition names for the configured version.
    pub fn partition_names(&self) -> PartitionNames {
        PartitionNames::for_version(&self.version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `LIFEBOAT_`
    /// 2. TOML file from `LIFEBOAT_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("LIFEBOAT_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("LIFEBOAT_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.version, "v1");
        assert_eq!(config.db_path, PathBuf::from("./lifeboat-cache.sqlite"));
        assert_eq!(config.api_prefix, "/api/");
        assert_eq!(config.user_agent, "lifeboat/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_bytes, 5_242_880);
        assert!(config.swr_wait_timeout_ms.is_none());
        assert!(config.static_manifest.contains(&"/index.html".to_string()));
    }

    #[test]
    fn test_timeout_durations() {
        let config = AppConfig { swr_wait_timeout_ms: Some(500), ..Default::default() };
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.swr_wait_timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_partition_names_follow_version() {
        let config = AppConfig { version: "v2.0".into(), ..Default::default() };
        let names = config.partition_names();
        assert_eq!(names.static_name, "static-v2.0");
        assert_eq!(names.dynamic_name, "dynamic-v2.0");
    }
}
