//! Command execution context
//!
//! Loads configuration, applies CLI overrides and opens the cache store, so
//! handlers only deal with their own command.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::cli::{GlobalOptions, OutputFormat};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::Result;
use crate::net::HttpNetwork;
use crate::worker::{Worker, WorkerSettings};

/// Context for command execution containing config, store and output format.
pub struct CommandContext {
    /// Loaded and validated configuration, with CLI overrides applied
    pub config: Config,
    /// Resolved cache directory
    pub cache_dir: PathBuf,
    /// Shared cache store
    pub store: Arc<CacheStore>,
    /// Output format preference
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load config and open the store.
    ///
    /// # Errors
    /// Returns error if the config is invalid or the store cannot be opened.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let mut config = Config::load_at(opts.config_ref())?;
        if let Some(dir) = opts.cache_dir_ref() {
            config.cache_dir = Some(dir.to_path_buf());
        }

        let cache_dir = config.resolve_cache_dir()?;
        let store = Arc::new(CacheStore::open_at(&cache_dir)?);

        Ok(Self {
            config,
            cache_dir,
            store,
            format: opts.format,
        })
    }

    /// Build a worker for the configured version over the real network
    pub fn worker(&self) -> Result<Worker> {
        let settings = WorkerSettings::from_config(&self.config)?;
        let network = HttpNetwork::new(self.config.request_timeout())?;

        Ok(Worker::new(
            settings,
            Arc::clone(&self.store),
            Arc::new(network),
            Arc::new(SystemClock),
        ))
    }
}
