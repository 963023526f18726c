//! Local cache for intercepted responses
//!
//! Provides SQLite-backed, version-namespaced storage with file blob storage
//! for large bodies, plus the freshness rules applied per request class.

pub mod freshness;
pub mod key;
pub mod storage;

use std::time::Duration;

/// Freshness windows per request class.
pub struct CacheTtl;

impl CacheTtl {
    // Upstream data changes often but is fine to show for a few minutes offline
    pub const API: Duration = Duration::from_secs(10 * 60); // 10 min

    // Build assets only change between releases
    pub const STATIC: Duration = Duration::from_secs(24 * 60 * 60); // 24 hr
}

// Re-export main types
pub use freshness::is_expired;
pub use key::{blob_name, request_key};
pub use storage::{CacheEntry, CacheStore, Namespace};
