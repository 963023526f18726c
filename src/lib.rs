//! edgecache - request-interception caching layer for offline-capable web apps
//!
//! Requests are classified as api, static or dynamic and served with a
//! per-class strategy from versioned cache namespaces. A version is
//! installed by prefetching its static manifest and activated by deleting
//! every namespace that belongs to another version.

pub mod cache;
pub mod classify;
pub mod cli;
pub mod clients;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod output;
pub mod strategy;
pub mod tasks;
pub mod worker;

pub use error::{Error, Result};
