//! Configuration management for edgecache

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CacheStore;
use crate::error::{ConfigError, Error, Result};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Version tag of the build being served; namespaces are keyed by it
    #[serde(default = "default_version")]
    pub version: String,

    /// Application origin; relative manifest entries resolve against it
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Upstream data-provider hostnames served network-first with a short TTL
    #[serde(default = "default_api_hosts")]
    pub api_hosts: Vec<String>,

    /// Assets prefetched at install and served cache-first
    #[serde(default = "default_static_manifest")]
    pub static_manifest: Vec<String>,

    /// Cache location override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Behaviour tweaks
    #[serde(default)]
    pub preferences: Preferences,
}

/// Secondary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// Background sync tag that triggers the reconnect broadcast
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Title of push notifications
    #[serde(default = "default_notification_title")]
    pub notification_title: String,

    /// Heading of the offline page
    #[serde(default = "default_offline_title")]
    pub offline_title: String,

    /// Per-request origin timeout; unset means no deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_api_hosts() -> Vec<String> {
    vec![
        "api.open-meteo.com".to_string(),
        "geocoding-api.open-meteo.com".to_string(),
    ]
}

fn default_static_manifest() -> Vec<String> {
    ["/", "/index.html", "/styles.css", "/app.js", "/manifest.json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sync_tag() -> String {
    "weather-sync".to_string()
}

fn default_notification_title() -> String {
    "Weather update".to_string()
}

fn default_offline_title() -> String {
    "You are offline".to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sync_tag: default_sync_tag(),
            notification_title: default_notification_title(),
            offline_title: default_offline_title(),
            request_timeout_secs: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            origin: default_origin(),
            api_hosts: default_api_hosts(),
            static_manifest: default_static_manifest(),
            cache_dir: None,
            preferences: Preferences::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".edgecache").join("config.yaml"))
    }

    /// Resolve an optional override against the default location
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load from an optional override path. A missing file yields defaults.
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        let path = Self::resolve_path(path)?;
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check the fields that cannot be defaulted sensibly
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("version must not be empty".to_string()).into());
        }
        self.manifest_urls()?;
        Ok(())
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin)
            .map_err(|e| Error::from(ConfigError::Invalid(format!("origin {}: {}", self.origin, e))))
    }

    /// Static manifest as absolute URLs
    pub fn manifest_urls(&self) -> Result<Vec<Url>> {
        let origin = self.origin_url()?;
        self.static_manifest
            .iter()
            .map(|entry| {
                origin.join(entry).map_err(|e| {
                    Error::from(ConfigError::Invalid(format!(
                        "manifest entry {}: {}",
                        entry, e
                    )))
                })
            })
            .collect()
    }

    /// Cache directory: config override, else the platform cache dir
    pub fn resolve_cache_dir(&self) -> Result<PathBuf> {
        match self.cache_dir {
            Some(ref dir) => Ok(dir.clone()),
            None => Ok(CacheStore::cache_dir()?),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.preferences
            .request_timeout_secs
            .map(Duration::from_secs)
    }
}
