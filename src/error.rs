//! Error types for edgecache

use thiserror::Error;

/// Result type alias for edgecache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Failures of a single network attempt.
///
/// Both variants drive the same cache/fallback path inside the strategy
/// engine; they are only distinguished for logging.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned HTTP {0}")]
    Http(u16),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            FetchError::Network("Failed to connect to origin".to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Persistent cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Could not determine cache directory")]
    NoHome,

    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Version install/activate errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Install of version {version} aborted: failed to prefetch {url}: {source}")]
    Prefetch {
        version: String,
        url: String,
        source: FetchError,
    },

    #[error("Storage failure while handling version {version}: {source}")]
    Storage {
        version: String,
        source: CacheError,
    },

    #[error("No installed version {0} is waiting to activate")]
    NothingWaiting(String),

    #[error("Version {0} is not installed; install it before activating")]
    NotInstalled(String),
}
