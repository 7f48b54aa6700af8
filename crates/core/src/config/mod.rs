//! Engine build configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading:
//!
//! 1. TOML config file (path supplied by the embedding host)
//! 2. Built-in defaults
//!
//! The engine reads no environment variables; everything it needs is
//! declared by the build that embeds it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{AssetManifest, Error, NamespaceTag};

mod validation;

pub use validation::ConfigError;

/// How GET requests are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from the namespace; go to the network only on a miss.
    #[default]
    CacheFirst,
    /// Serve from the namespace and refresh it from the network in the
    /// background on every request.
    StaleWhileRevalidate,
}

/// Engine build configuration.
///
/// Loading precedence (highest wins):
/// 1. TOML config file
/// 2. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Namespace tag of this engine build. Must differ from every prior build.
    #[serde(default)]
    pub tag: String,

    /// Application origin; relative asset references resolve against it.
    #[serde(default)]
    pub origin: String,

    /// Same-origin assets that must all be populated.
    #[serde(default)]
    pub required: Vec<String>,

    /// Cross-origin assets populated independently, failures tolerated.
    #[serde(default)]
    pub optional: Vec<String>,

    /// Interception strategy for GET requests.
    #[serde(default)]
    pub strategy: Strategy,

    /// Supersede a running version as soon as population succeeds.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Page served to navigations that miss the cache while offline.
    /// Must also be listed in `required`.
    #[serde(default)]
    pub offline_fallback: Option<String>,

    /// Path to SQLite namespace store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds, enforced by the transport.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./precache.sqlite")
}

fn default_user_agent() -> String {
    "precache/0.1".into()
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tag: String::new(),
            origin: String::new(),
            required: Vec::new(),
            optional: Vec::new(),
            strategy: Strategy::default(),
            skip_waiting: true,
            offline_fallback: None,
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from a TOML file layered over defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or if
    /// validation fails after loading.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::extract(Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(path.as_ref())))
    }

    /// Load configuration from TOML source text layered over defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(source)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parsed application origin.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let origin = Url::parse(self.origin.trim())
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match origin.scheme() {
            "http" | "https" => Ok(origin),
            scheme => Err(ConfigError::Invalid {
                field: "origin".into(),
                reason: format!("unsupported scheme: {scheme}"),
            }),
        }
    }

    /// Tag of this build as a typed value.
    pub fn namespace_tag(&self) -> Result<NamespaceTag, Error> {
        NamespaceTag::new(self.tag.clone())
    }

    /// Resolve the declared asset lists against the origin.
    pub fn manifest(&self) -> Result<AssetManifest, Error> {
        let origin = self.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let required: Vec<&str> = self.required.iter().map(String::as_str).collect();
        let optional: Vec<&str> = self.optional.iter().map(String::as_str).collect();
        AssetManifest::resolve(&origin, &required, &optional)
    }

    /// Resolved offline fallback URL, if configured.
    pub fn offline_fallback_url(&self) -> Result<Option<Url>, Error> {
        let Some(fallback) = self.offline_fallback.as_deref() else {
            return Ok(None);
        };
        let origin = self.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Some(crate::url::resolve(&origin, fallback)?))
    }
}
