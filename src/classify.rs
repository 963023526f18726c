//! Request classification by upstream host and static manifest membership

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::cache::CacheTtl;
use crate::cache::key::canonical_url;
use crate::http::Request;

/// Caching strategy class of a request. Decided once, before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestClass {
    /// Upstream data provider: network-first with a short freshness window
    Api,
    /// Build-time asset: cache-first with background refresh
    Static,
    /// Everything else: network-first, any cached copy is an acceptable last resort
    Dynamic,
}

impl RequestClass {
    pub const ALL: [RequestClass; 3] = [
        RequestClass::Api,
        RequestClass::Static,
        RequestClass::Dynamic,
    ];

    /// Freshness window; `None` means always revalidate and never expire
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            RequestClass::Api => Some(CacheTtl::API),
            RequestClass::Static => Some(CacheTtl::STATIC),
            RequestClass::Dynamic => None,
        }
    }

    /// Logical namespace name entries of this class are stored under
    pub fn namespace(&self) -> &'static str {
        match self {
            RequestClass::Api => "api",
            RequestClass::Static => "static",
            RequestClass::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Maps requests to a [`RequestClass`] using two fixed lists.
#[derive(Debug, Clone, Default)]
pub struct RequestClassifier {
    api_hosts: HashSet<String>,
    manifest: HashSet<String>,
}

impl RequestClassifier {
    pub fn new<H, S>(api_hosts: H, manifest: &[Url]) -> Self
    where
        H: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            api_hosts: api_hosts
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
            manifest: manifest.iter().map(canonical_url).collect(),
        }
    }

    /// Classify a GET request. Host allow-list wins over manifest membership.
    pub fn classify(&self, request: &Request) -> RequestClass {
        let host = request.url.host_str().unwrap_or_default();
        if self.api_hosts.contains(host) {
            return RequestClass::Api;
        }

        if self.manifest.contains(&canonical_url(&request.url)) {
            return RequestClass::Static;
        }

        RequestClass::Dynamic
    }
}
