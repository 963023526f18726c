//! Version lifecycle: atomic install-time prefetch and activate-time cleanup
//!
//! A version is *installed* when its static namespace holds every manifest
//! asset, and *active* once every namespace of any other version is gone.
//! Both markers are persisted in the store's meta table.

use std::sync::Arc;

use futures::future::try_join_all;
use log::{debug, info};
use reqwest::Method;
use url::Url;

use crate::cache::storage::PendingEntry;
use crate::cache::{CacheStore, Namespace, request_key};
use crate::classify::RequestClass;
use crate::clock::Clock;
use crate::error::{CacheError, LifecycleError};
use crate::http::Request;
use crate::net::{Network, fetch_ok};

/// Meta key holding the version that controls clients
pub const ACTIVE_VERSION: &str = "active_version";

/// Meta key holding an installed version not yet activated
pub const WAITING_VERSION: &str = "waiting_version";

type Result<T> = std::result::Result<T, LifecycleError>;

/// Outcome of a successful install
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub version: String,
    pub namespace: Namespace,
    pub prefetched: usize,
    pub bytes: usize,
}

/// Outcome of a successful activation
#[derive(Debug, Clone)]
pub struct ActivateReport {
    pub version: String,
    pub previous: Option<String>,
    /// Namespaces removed, with the number of entries each held
    pub deleted: Vec<(Namespace, usize)>,
}

pub struct LifecycleManager {
    store: Arc<CacheStore>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    manifest: Vec<Url>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<CacheStore>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
        manifest: Vec<Url>,
    ) -> Self {
        Self {
            store,
            network,
            clock,
            manifest,
        }
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub fn active_version(&self) -> std::result::Result<Option<String>, CacheError> {
        self.store.get_meta(ACTIVE_VERSION)
    }

    pub fn waiting_version(&self) -> std::result::Result<Option<String>, CacheError> {
        self.store.get_meta(WAITING_VERSION)
    }

    /// Prefetch the whole manifest into `version`'s static namespace.
    ///
    /// All-or-nothing: the first failed fetch (transport or non-2xx) aborts the
    /// install before anything is written, and the store write itself is a
    /// single transaction. On failure the active version is untouched.
    pub async fn on_install(&self, version: &str) -> Result<InstallReport> {
        let ns = Namespace::new(RequestClass::Static.namespace(), version);
        info!(
            "Installing version {}: prefetching {} asset(s)",
            version,
            self.manifest.len()
        );

        let network = self.network.as_ref();
        let fetches = self.manifest.iter().map(|url| async move {
            let request = Request::new(Method::GET, url.clone());
            match fetch_ok(network, &request).await {
                Ok(response) => {
                    debug!("Prefetched {}", url);
                    Ok(PendingEntry {
                        key: request_key(&request.method, &request.url),
                        url: url.to_string(),
                        response,
                    })
                }
                Err(source) => Err(LifecycleError::Prefetch {
                    version: version.to_string(),
                    url: url.to_string(),
                    source,
                }),
            }
        });

        let entries = try_join_all(fetches).await?;
        let bytes = entries.iter().map(|e| e.response.body.len()).sum();

        self.store
            .put_all(&ns, &entries, self.clock.now())
            .and_then(|()| self.store.set_meta(WAITING_VERSION, version))
            .map_err(|source| LifecycleError::Storage {
                version: version.to_string(),
                source,
            })?;

        info!("Installed version {} ({} assets)", version, entries.len());

        Ok(InstallReport {
            version: version.to_string(),
            namespace: ns,
            prefetched: entries.len(),
            bytes,
        })
    }

    /// Delete every namespace not belonging to `version`, then mark it active.
    ///
    /// Only the waiting version (or the already active one) can be activated;
    /// anything else fails with [`LifecycleError::NotInstalled`] before a
    /// single namespace is touched. Returns only after deletion has completed;
    /// callers hand clients over to the new version after this returns.
    pub fn on_activate(&self, version: &str) -> Result<ActivateReport> {
        let storage_err = |source| LifecycleError::Storage {
            version: version.to_string(),
            source,
        };

        let previous = self.active_version().map_err(storage_err)?;
        let waiting = self.waiting_version().map_err(storage_err)?;
        if waiting.as_deref() != Some(version) && previous.as_deref() != Some(version) {
            return Err(LifecycleError::NotInstalled(version.to_string()));
        }

        let mut deleted = Vec::new();

        for info in self.store.list_namespaces().map_err(storage_err)? {
            if info.namespace.version == version {
                continue;
            }
            let removed = self
                .store
                .delete_namespace(&info.namespace)
                .map_err(storage_err)?;
            info!("Deleted namespace {} ({} entries)", info.namespace, removed);
            deleted.push((info.namespace, removed));
        }

        self.store
            .set_meta(ACTIVE_VERSION, version)
            .map_err(storage_err)?;
        if waiting.as_deref() == Some(version) {
            self.store.delete_meta(WAITING_VERSION).map_err(storage_err)?;
        }

        info!("Activated version {}", version);

        Ok(ActivateReport {
            version: version.to_string(),
            previous,
            deleted,
        })
    }
}
