//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from files or defaults.

use crate::config::AppConfig;
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
    /// Returns `ConfigError::Missing` if `tag` or `origin` is unset, and
    /// `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL
    /// - `max_bytes` is 0 or exceeds 100MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - the asset lists overlap or contain unresolvable entries
    /// - `offline_fallback` is not one of the required assets
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tag.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "tag".into(),
                hint: "each engine build needs a tag distinct from all prior builds".into(),
            });
        }

        if self.origin.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "origin".into(),
                hint: "set the application base URL, e.g. https://app.example/".into(),
            });
        }
        self.origin_url()?;

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 100 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 100MB".into() });
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

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        let manifest = self
            .manifest()
            .map_err(|e| ConfigError::Invalid { field: "required/optional".into(), reason: e.to_string() })?;

        let fallback = self
            .offline_fallback_url()
            .map_err(|e| ConfigError::Invalid { field: "offline_fallback".into(), reason: e.to_string() })?;
        if let Some(fallback) = fallback
            && !manifest.required().contains(&fallback)
        {
            return Err(ConfigError::Invalid {
                field: "offline_fallback".into(),
                reason: format!("{fallback} must be listed in required"),
            });
        }

        if manifest.required().is_empty() {
            tracing::warn!(tag = %self.tag, "no required assets declared; offline start will depend on runtime caching");
        }

        Ok(())
    }
}
