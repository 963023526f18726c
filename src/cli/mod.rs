//! CLI command definitions and handlers

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::worker::NotificationAction;

pub mod args;
pub mod cache;
pub mod classify;
pub mod context;
pub mod events;
pub mod fetch;
pub mod lifecycle;
pub mod status;

pub use args::{GlobalOptions, OutputFormat};
pub use context::CommandContext;

/// edgecache - offline-first request caching for web apps
#[derive(Parser, Debug)]
#[command(name = "edgecache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "EDGECACHE_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "EDGECACHE_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "EDGECACHE_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Override the cache directory
    #[arg(long, global = true, env = "EDGECACHE_CACHE_DIR", hide_env = true)]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a request through the worker
    Fetch {
        /// Request URL
        url: String,

        /// HTTP method; anything but GET bypasses the cache
        #[arg(long, short = 'X', default_value = "GET")]
        method: String,

        /// Accept header (text/html gets the offline page when unavailable)
        #[arg(long)]
        accept: Option<String>,

        /// Request body
        #[arg(long, short = 'd')]
        data: Option<String>,
    },

    /// Show how a URL would be classified and cached
    Classify {
        /// Request URL
        url: String,
    },

    /// Prefetch the static manifest for the configured version
    Install,

    /// Activate the configured version and delete every other version's caches
    Activate,

    /// Activate the configured version if it is installed and waiting
    SkipWaiting,

    /// Show configuration and version status
    Status,

    /// Fire a background sync tag
    Sync {
        /// Sync tag (defaults to the configured tag)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Deliver a push message and show the resulting notification
    Push {
        /// Notification text
        payload: Option<String>,
    },

    /// Act on a notification
    NotificationClick {
        /// Action taken (view, dismiss)
        action: NotificationAction,
    },

    /// Manage the local cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Display version information
    Version,
}

/// Cache management subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,

    /// Remove every namespace and entry
    Clear,

    /// Print the cache directory
    Path,

    /// List cached entries
    List {
        /// Only list one namespace (e.g. static-v1)
        #[arg(long)]
        namespace: Option<String>,
    },
}
