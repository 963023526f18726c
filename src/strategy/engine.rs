//! Strategy engine: network-first for api/dynamic, cache-first for static
//!
//! Network and HTTP failures never escape `handle`; they only steer the
//! request towards the cache or the offline fallback. Cache writes are best
//! effort and never hold back a response that is already in hand.

use std::sync::Arc;

use log::{debug, warn};

use super::Served;
use crate::cache::{CacheEntry, CacheStore, Namespace, is_expired, request_key};
use crate::classify::{RequestClass, RequestClassifier};
use crate::clock::Clock;
use crate::fallback::OfflineFallback;
use crate::http::{Request, Response};
use crate::net::{Network, fetch_ok};
use crate::tasks::BackgroundTasks;

/// Serves GET requests for one version's namespaces.
pub struct StrategyEngine {
    version: String,
    store: Arc<CacheStore>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    classifier: Arc<RequestClassifier>,
    fallback: Arc<OfflineFallback>,
    background: Arc<BackgroundTasks>,
}

impl StrategyEngine {
    pub fn new(
        version: impl Into<String>,
        store: Arc<CacheStore>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
        classifier: Arc<RequestClassifier>,
        fallback: Arc<OfflineFallback>,
        background: Arc<BackgroundTasks>,
    ) -> Self {
        Self {
            version: version.into(),
            store,
            network,
            clock,
            classifier,
            fallback,
            background,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Scope holding background refreshes spawned by this engine
    pub fn background(&self) -> &Arc<BackgroundTasks> {
        &self.background
    }

    /// Current namespace for a class
    pub fn namespace(&self, class: RequestClass) -> Namespace {
        Namespace::new(class.namespace(), self.version.as_str())
    }

    /// Serve a GET request. Callers route every other method around the engine.
    pub async fn handle(&self, request: &Request) -> Served {
        let class = self.classifier.classify(request);
        debug!("{} {} classified as {}", request.method, request.url, class);

        match class {
            RequestClass::Static => self.cache_first(request, class).await,
            RequestClass::Api | RequestClass::Dynamic => self.network_first(request, class).await,
        }
    }

    /// Network, then a cached copy within the class TTL, then the fallback.
    ///
    /// Dynamic has no TTL, so any stored copy qualifies.
    async fn network_first(&self, request: &Request, class: RequestClass) -> Served {
        let ns = self.namespace(class);
        let key = request_key(&request.method, &request.url);

        let err = match fetch_ok(self.network.as_ref(), request).await {
            Ok(response) => {
                self.store_best_effort(&ns, &key, request, &response);
                return Served::network(class, response);
            }
            Err(err) => err,
        };

        debug!("Network attempt for {} failed: {}", request.url, err);

        if let Some(entry) = self.lookup(&ns, &key) {
            if !is_expired(entry.stored_at, self.clock.now(), class.ttl()) {
                debug!("Cache hit ({}): {}", ns, request.url);
                return Served::cache(class, entry.response, entry.stored_at);
            }

            debug!("Cache entry expired ({}): {}", ns, request.url);
            if let Err(e) = self.store.delete(&ns, &key) {
                warn!("Failed to delete expired entry {}: {}", request.url, e);
            }
        }

        Served::fallback(class, self.fallback.respond(request, class))
    }

    /// Cache first, whatever the age; stale hits are refreshed in the background.
    async fn cache_first(&self, request: &Request, class: RequestClass) -> Served {
        let ns = self.namespace(class);
        let key = request_key(&request.method, &request.url);

        if let Some(entry) = self.lookup(&ns, &key) {
            if is_expired(entry.stored_at, self.clock.now(), class.ttl()) {
                debug!("Stale hit ({}), refreshing in background: {}", ns, request.url);
                self.refresh_in_background(request.clone(), ns, key);
            } else {
                debug!("Cache hit ({}): {}", ns, request.url);
            }
            return Served::cache(class, entry.response, entry.stored_at);
        }

        match fetch_ok(self.network.as_ref(), request).await {
            Ok(response) => {
                self.store_best_effort(&ns, &key, request, &response);
                Served::network(class, response)
            }
            Err(err) => {
                debug!("Network attempt for {} failed: {}", request.url, err);
                // Another request may have filled the entry while this one was in flight
                match self.lookup(&ns, &key) {
                    Some(entry) => Served::cache(class, entry.response, entry.stored_at),
                    None => Served::fallback(class, self.fallback.respond(request, class)),
                }
            }
        }
    }

    fn refresh_in_background(&self, request: Request, ns: Namespace, key: String) {
        let store = Arc::clone(&self.store);
        let network = Arc::clone(&self.network);
        let clock = Arc::clone(&self.clock);

        self.background.wait_until(async move {
            match fetch_ok(network.as_ref(), &request).await {
                Ok(response) => {
                    let url = request.url.to_string();
                    match store.put(&ns, &key, &url, &response, clock.now()) {
                        Ok(()) => debug!("Background refresh stored {}", url),
                        Err(e) => warn!("Background refresh could not store {}: {}", url, e),
                    }
                }
                Err(e) => debug!("Background refresh of {} failed: {}", request.url, e),
            }
        });
    }

    /// Storage read failures are treated as a miss
    fn lookup(&self, ns: &Namespace, key: &str) -> Option<CacheEntry> {
        match self.store.get(ns, key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Storage write failures are logged and dropped
    fn store_best_effort(&self, ns: &Namespace, key: &str, request: &Request, response: &Response) {
        let url = request.url.to_string();
        if let Err(e) = self.store.put(ns, key, &url, response, self.clock.now()) {
            warn!("Cache write failed for {}: {}", url, e);
        }
    }
}
