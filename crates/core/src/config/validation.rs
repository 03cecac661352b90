//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use crate::request::canonicalize;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `version` is empty or contains whitespace (it names partitions)
    /// - `scope_origin` is not a valid http(s) URL
    /// - `api_prefix` does not start with `/`
    /// - a manifest entry is neither a valid absolute URL nor a `/` path
    /// - `timeout_ms`, `max_bytes`, or `user_agent` are out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.is_empty() || self.version.chars().any(|c| c.is_whitespace()) {
            return Err(ConfigError::Invalid {
                field: "version".into(),
                reason: "must be a non-empty tag without whitespace".into(),
            });
        }

        canonicalize(&self.scope_origin).map_err(|e| ConfigError::Invalid {
            field: "scope_origin".into(),
            reason: e.to_string(),
        })?;

        if !self.api_prefix.starts_with('/') {
            return Err(ConfigError::Invalid { field: "api_prefix".into(), reason: "must start with '/'".into() });
        }

        for entry in &self.static_manifest {
            if entry.contains("://") {
                canonicalize(entry).map_err(|e| ConfigError::Invalid {
                    field: "static_manifest".into(),
                    reason: format!("{entry}: {e}"),
                })?;
            } else if !entry.starts_with('/') {
                return Err(ConfigError::Invalid {
                    field: "static_manifest".into(),
                    reason: format!("relative entry {entry} must start with '/'"),
                });
            }
        }

        if self.static_manifest.is_empty() {
            tracing::warn!("static_manifest is empty; nothing will be warmed during install");
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if let Some(swr) = self.swr_wait_timeout_ms
            && swr == 0
        {
            return Err(ConfigError::Invalid {
                field: "swr_wait_timeout_ms".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        Ok(())
    }
}
