//! The worker: registration, event dispatch and the interception boundary
//!
//! One `Worker` owns one version of the application. It installs and
//! activates that version through the [`LifecycleManager`], and routes
//! intercepted requests to the [`StrategyEngine`] of whichever version
//! currently controls clients. That may be an older version while this one
//! is waiting.

use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStore, Namespace};
use crate::classify::{RequestClass, RequestClassifier};
use crate::clients::{ClientMessage, ClientRegistry};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{LifecycleError, Result};
use crate::fallback::OfflineFallback;
use crate::http::Request;
use crate::lifecycle::{ActivateReport, InstallReport, LifecycleManager};
use crate::net::Network;
use crate::strategy::{Served, StrategyEngine};
use crate::tasks::BackgroundTasks;

pub mod events;

pub use events::{
    ControlMessage, Event, EventOutcome, Notification, NotificationAction, Registration,
};

/// Body of a push notification that arrives without a payload
pub const DEFAULT_PUSH_BODY: &str = "New weather data is available";

/// Everything a worker needs to know about the build it serves
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub version: String,
    pub origin: Url,
    pub manifest: Vec<Url>,
    pub api_hosts: Vec<String>,
    pub sync_tag: String,
    pub notification_title: String,
    pub offline_title: String,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            version: config.version.clone(),
            origin: config.origin_url()?,
            manifest: config.manifest_urls()?,
            api_hosts: config.api_hosts.clone(),
            sync_tag: config.preferences.sync_tag.clone(),
            notification_title: config.preferences.notification_title.clone(),
            offline_title: config.preferences.offline_title.clone(),
        })
    }
}

pub struct Worker {
    settings: WorkerSettings,
    store: Arc<CacheStore>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    lifecycle: LifecycleManager,
    classifier: Arc<RequestClassifier>,
    fallback: Arc<OfflineFallback>,
    background: Arc<BackgroundTasks>,
    clients: ClientRegistry,
    controller: RwLock<Option<Arc<StrategyEngine>>>,
}

impl Worker {
    pub fn new(
        settings: WorkerSettings,
        store: Arc<CacheStore>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lifecycle = LifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&network),
            Arc::clone(&clock),
            settings.manifest.clone(),
        );
        let classifier = Arc::new(RequestClassifier::new(
            settings.api_hosts.iter().map(String::as_str),
            &settings.manifest,
        ));
        let fallback = Arc::new(OfflineFallback::new(settings.offline_title.clone()));

        Self {
            settings,
            store,
            network,
            clock,
            lifecycle,
            classifier,
            fallback,
            background: Arc::new(BackgroundTasks::new()),
            clients: ClientRegistry::new(),
            controller: RwLock::new(None),
        }
    }

    pub fn version(&self) -> &str {
        &self.settings.version
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Version whose engine currently serves fetches
    pub fn controller_version(&self) -> Option<String> {
        self.controller().map(|engine| engine.version().to_string())
    }

    /// Bring this worker's version up.
    ///
    /// Installs unless already installed, then activates at once when no open
    /// client is held by another version. Otherwise the version waits and the
    /// active one keeps serving. A failed install leaves the active version in
    /// control and returns the error.
    pub async fn register(&self) -> Result<Registration> {
        let version = self.settings.version.clone();
        let active = self.lifecycle.active_version()?;

        if active.as_deref() == Some(version.as_str()) {
            self.set_controller(&version);
            return Ok(Registration::Active { version });
        }

        if self.lifecycle.waiting_version()?.as_deref() != Some(version.as_str()) {
            if let Err(e) = self.lifecycle.on_install(&version).await {
                if let Some(ref active) = active {
                    warn!("Install of {} failed, {} stays active", version, active);
                    self.set_controller(active);
                }
                return Err(e.into());
            }
        }

        match active {
            Some(active) if self.clients.has_clients_controlled_by_other(&version) => {
                info!("Version {} is waiting; {} still controls clients", version, active);
                self.set_controller(&active);
                Ok(Registration::Waiting { version, active })
            }
            _ => {
                self.activate()?;
                Ok(Registration::Active { version })
            }
        }
    }

    /// Point the controller at the persisted active version, if there is one.
    /// Nothing is installed or activated.
    pub fn resume(&self) -> Result<Option<String>> {
        let active = self.lifecycle.active_version()?;
        if let Some(ref version) = active {
            self.set_controller(version);
        }
        Ok(active)
    }

    /// Interception boundary.
    ///
    /// GET requests go through the controlling version's strategy engine.
    /// Anything else, or any request while no version is in control, goes
    /// straight to the network, and transport failures are returned as-is.
    pub async fn fetch(&self, request: &Request) -> Result<Served> {
        if request.is_get() {
            if let Some(engine) = self.controller() {
                return Ok(engine.handle(request).await);
            }
            debug!("No controlling version, passing {} through", request.url);
        }

        let response = self.network.fetch(request).await?;
        Ok(Served::pass_through(response))
    }

    pub async fn handle_event(&self, event: Event) -> Result<EventOutcome> {
        match event {
            Event::Install => {
                let report = self.install().await?;
                Ok(EventOutcome::Installed(report))
            }
            Event::Activate => Ok(EventOutcome::Activated(self.activate()?)),
            Event::Fetch(request) => Ok(EventOutcome::Served(self.fetch(&request).await?)),
            Event::Message(ControlMessage::SkipWaiting) => {
                Ok(EventOutcome::Activated(self.skip_waiting()?))
            }
            Event::Push(payload) => Ok(EventOutcome::Notification(self.notification(payload))),
            Event::NotificationClick(NotificationAction::View) => {
                let client = match self.clients.list().first() {
                    Some(client) => client.id,
                    None => self.clients.connect(self.controller_version()).id,
                };
                let url = self.root_url();
                self.clients.broadcast(ClientMessage::Navigate {
                    client,
                    url: url.clone(),
                });
                Ok(EventOutcome::Navigated { client, url })
            }
            Event::NotificationClick(NotificationAction::Dismiss) => Ok(EventOutcome::Dismissed),
            Event::Sync(tag) => {
                if tag != self.settings.sync_tag {
                    debug!("Ignoring sync tag {}", tag);
                    return Ok(EventOutcome::Ignored);
                }
                let recipients = self.clients.broadcast(ClientMessage::SyncComplete {
                    tag: tag.clone(),
                    at: self.clock.now(),
                });
                info!("Sync {} broadcast to {} client(s)", tag, recipients);
                Ok(EventOutcome::Broadcast { tag, recipients })
            }
        }
    }

    /// Wait for every background refresh spawned so far
    pub async fn settle(&self) {
        self.background.settle().await;
    }

    /// Prefetch this version's manifest; it is left waiting
    pub async fn install(&self) -> Result<InstallReport> {
        Ok(self.lifecycle.on_install(&self.settings.version).await?)
    }

    /// Garbage-collect, switch the controller, then claim open clients
    pub fn activate(&self) -> Result<ActivateReport> {
        let report = self.lifecycle.on_activate(&self.settings.version)?;
        self.set_controller(&self.settings.version);
        let claimed = self.clients.claim(&self.settings.version);
        debug!("Claimed {} client(s) for {}", claimed, self.settings.version);
        Ok(report)
    }

    /// Activate now, provided this version is the one installed and waiting
    pub fn skip_waiting(&self) -> Result<ActivateReport> {
        let waiting = self.lifecycle.waiting_version()?;
        if waiting.as_deref() != Some(self.settings.version.as_str()) {
            let version = self.settings.version.clone();
            return Err(LifecycleError::NothingWaiting(version).into());
        }
        info!("Skip-waiting requested for {}", self.settings.version);
        self.activate()
    }

    fn notification(&self, payload: Option<String>) -> Notification {
        Notification {
            title: self.settings.notification_title.clone(),
            body: payload.unwrap_or_else(|| DEFAULT_PUSH_BODY.to_string()),
            actions: vec![NotificationAction::View, NotificationAction::Dismiss],
        }
    }

    fn root_url(&self) -> String {
        match self.settings.origin.join("/") {
            Ok(root) => root.to_string(),
            Err(_) => self.settings.origin.to_string(),
        }
    }

    fn controller(&self) -> Option<Arc<StrategyEngine>> {
        self.controller.read().ok().and_then(|guard| guard.clone())
    }

    fn set_controller(&self, version: &str) {
        if self.controller().is_some_and(|engine| engine.version() == version) {
            return;
        }
        let engine = StrategyEngine::new(
            version,
            Arc::clone(&self.store),
            Arc::clone(&self.network),
            Arc::clone(&self.clock),
            self.classifier_for(version),
            Arc::clone(&self.fallback),
            Arc::clone(&self.background),
        );
        if let Ok(mut guard) = self.controller.write() {
            *guard = Some(Arc::new(engine));
        }
        debug!("Controller set to {}", version);
    }

    /// Classifier for the engine serving `version`.
    ///
    /// Another version's manifest is whatever its install prefetched into its
    /// static namespace. API hosts come from this worker's settings.
    fn classifier_for(&self, version: &str) -> Arc<RequestClassifier> {
        if version == self.settings.version {
            return Arc::clone(&self.classifier);
        }

        let ns = Namespace::new(RequestClass::Static.namespace(), version);
        let manifest: Vec<Url> = match self.store.list_entries(Some(&ns)) {
            Ok(entries) => entries
                .iter()
                .filter_map(|entry| Url::parse(&entry.url).ok())
                .collect(),
            Err(e) => {
                warn!("Failed to read manifest of {}: {}", version, e);
                Vec::new()
            }
        };
        debug!("Manifest of {} has {} asset(s)", version, manifest.len());

        Arc::new(RequestClassifier::new(
            self.settings.api_hosts.iter().map(String::as_str),
            &manifest,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::error::{Error, FetchError};
    use crate::http::Response;
    use crate::net::MockNetwork;
    use crate::strategy::ResponseSource;
    use reqwest::Method;
    use tempfile::TempDir;

    const ORIGIN: &str = "http://app.test";
    const INDEX: &str = "http://app.test/";
    const SCRIPT: &str = "http://app.test/app.js";
    const API_URL: &str = "https://api.weather.test/v1/forecast?lat=1&lon=2";
    const NEW_ASSET: &str = "http://app.test/new.js";

    fn settings(version: &str) -> WorkerSettings {
        WorkerSettings {
            version: version.to_string(),
            origin: Url::parse(ORIGIN).unwrap(),
            manifest: vec![Url::parse(INDEX).unwrap(), Url::parse(SCRIPT).unwrap()],
            api_hosts: vec!["api.weather.test".to_string()],
            sync_tag: "weather-sync".to_string(),
            notification_title: "Weather update".to_string(),
            offline_title: "You are offline".to_string(),
        }
    }

    fn network() -> Arc<MockNetwork> {
        Arc::new(
            MockNetwork::new()
                .with_route(INDEX, Response::new(200).with_body("<html>v</html>"))
                .with_route(SCRIPT, Response::new(200).with_body("run()"))
                .with_route(API_URL, Response::new(200).with_body(r#"{"t":1}"#)),
        )
    }

    fn worker(version: &str, store: &Arc<CacheStore>, network: &Arc<MockNetwork>) -> Worker {
        Worker::new(
            settings(version),
            store.clone(),
            network.clone(),
            Arc::new(SystemClock),
        )
    }

    fn store() -> (Arc<CacheStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        (Arc::new(CacheStore::open_at(dir.path()).unwrap()), dir)
    }

    #[tokio::test]
    async fn test_first_registration_activates() {
        let (store, _dir) = store();
        let network = network();
        let w = worker("v1", &store, &network);

        let reg = w.register().await.unwrap();

        assert_eq!(
            reg,
            Registration::Active {
                version: "v1".to_string()
            }
        );
        assert_eq!(w.controller_version().as_deref(), Some("v1"));
        let served = w.fetch(&Request::get(SCRIPT).unwrap()).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.class, Some(RequestClass::Static));
    }

    #[tokio::test]
    async fn test_reregistration_does_not_refetch() {
        let (store, _dir) = store();
        let network = network();
        worker("v1", &store, &network).register().await.unwrap();
        let calls = network.total_calls();

        let again = worker("v1", &store, &network);
        again.register().await.unwrap();

        assert_eq!(network.total_calls(), calls);
        assert_eq!(again.controller_version().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_new_version_waits_then_skip_waiting_takes_over() {
        let (store, _dir) = store();
        let network = network();
        worker("v1", &store, &network).register().await.unwrap();
        let v1_api = Namespace::new("api", "v1");
        store
            .put(
                &v1_api,
                "GET https://api.weather.test/x",
                "https://api.weather.test/x",
                &Response::new(200),
                chrono::Utc::now(),
            )
            .unwrap();

        let v2 = worker("v2", &store, &network);
        let mut page = v2.clients().connect(Some("v1".to_string()));

        let reg = v2.register().await.unwrap();
        assert_eq!(
            reg,
            Registration::Waiting {
                version: "v2".to_string(),
                active: "v1".to_string()
            }
        );
        // v1 still serves and still owns its namespaces
        assert_eq!(v2.controller_version().as_deref(), Some("v1"));
        assert!(
            store
                .list_namespaces()
                .unwrap()
                .iter()
                .any(|n| n.namespace.version == "v1")
        );

        let outcome = v2
            .handle_event(Event::Message(ControlMessage::SkipWaiting))
            .await
            .unwrap();

        match outcome {
            EventOutcome::Activated(report) => {
                assert_eq!(report.previous.as_deref(), Some("v1"));
                assert_eq!(report.deleted.len(), 2);
            }
            other => panic!("Expected Activated, got {:?}", other),
        }
        assert!(
            store
                .list_namespaces()
                .unwrap()
                .iter()
                .all(|n| n.namespace.version == "v2")
        );
        assert_eq!(v2.controller_version().as_deref(), Some("v2"));
        assert_eq!(v2.clients().list()[0].controller.as_deref(), Some("v2"));
        assert_eq!(
            page.messages.recv().await.unwrap(),
            ClientMessage::ControllerChanged {
                version: "v2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_skip_waiting_without_waiting_version_fails() {
        let (store, _dir) = store();
        let network = network();
        let w = worker("v1", &store, &network);
        w.register().await.unwrap();

        let err = w
            .handle_event(Event::Message(ControlMessage::SkipWaiting))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Lifecycle(LifecycleError::NothingWaiting(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_install_keeps_active_version_serving() {
        let (store, _dir) = store();
        let network = network();
        worker("v1", &store, &network).register().await.unwrap();

        network.set_route(SCRIPT, Response::new(500));
        let v2 = worker("v2", &store, &network);
        assert!(v2.register().await.is_err());

        assert_eq!(v2.controller_version().as_deref(), Some("v1"));
        assert_eq!(
            v2.lifecycle().active_version().unwrap().as_deref(),
            Some("v1")
        );
        let served = v2.fetch(&Request::get(INDEX).unwrap()).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_activate_event_after_failed_install_keeps_previous_cache() {
        let (store, _dir) = store();
        let network = network();
        worker("v1", &store, &network).register().await.unwrap();

        network.set_route(SCRIPT, Response::new(500));
        let v2 = worker("v2", &store, &network);
        assert!(v2.handle_event(Event::Install).await.is_err());

        let err = v2.handle_event(Event::Activate).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle(LifecycleError::NotInstalled(_))
        ));

        assert_eq!(
            v2.lifecycle().active_version().unwrap().as_deref(),
            Some("v1")
        );
        let v1 = worker("v1", &store, &network);
        v1.resume().unwrap();
        network.set_offline(true);
        let served = v1.fetch(&Request::get(SCRIPT).unwrap()).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.body, b"run()");
    }

    #[tokio::test]
    async fn test_waiting_version_serves_with_active_version_manifest() {
        let (store, _dir) = store();
        let network = network();
        network.set_route(NEW_ASSET, Response::new(200).with_body("next()"));
        worker("v1", &store, &network).register().await.unwrap();

        let mut v2_settings = settings("v2");
        v2_settings.manifest.push(Url::parse(NEW_ASSET).unwrap());
        let v2 = Worker::new(
            v2_settings,
            store.clone(),
            network.clone(),
            Arc::new(SystemClock),
        );
        v2.clients().connect(Some("v1".to_string()));
        assert!(matches!(
            v2.register().await.unwrap(),
            Registration::Waiting { .. }
        ));

        // Not in v1's manifest, so v1 treats it as dynamic
        let served = v2.fetch(&Request::get(NEW_ASSET).unwrap()).await.unwrap();
        assert_eq!(served.class, Some(RequestClass::Dynamic));
        assert_eq!(served.source, ResponseSource::Network);
        assert!(
            store
                .get(&Namespace::new("static", "v1"), &format!("GET {}", NEW_ASSET))
                .unwrap()
                .is_none()
        );

        let script = v2.fetch(&Request::get(SCRIPT).unwrap()).await.unwrap();
        assert_eq!(script.class, Some(RequestClass::Static));
        assert_eq!(script.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_fetch_before_registration_passes_through() {
        let (store, _dir) = store();
        let network = network();
        let w = worker("v1", &store, &network);

        let served = w.fetch(&Request::get(API_URL).unwrap()).await.unwrap();

        assert_eq!(served.source, ResponseSource::PassThrough);
        assert!(store.list_namespaces().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_get_passes_through_untouched() {
        let (store, _dir) = store();
        let network = network();
        let w = worker("v1", &store, &network);
        w.register().await.unwrap();

        let post = Request::new(Method::POST, Url::parse(API_URL).unwrap()).with_body("{}");
        let served = w.fetch(&post).await.unwrap();

        assert_eq!(served.source, ResponseSource::PassThrough);
        assert!(
            store
                .list_entries(Some(&Namespace::new("api", "v1")))
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_pass_through_failure_is_an_error() {
        let (store, _dir) = store();
        let network = network();
        let w = worker("v1", &store, &network);
        w.register().await.unwrap();
        network.set_offline(true);

        let post = Request::new(Method::POST, Url::parse(API_URL).unwrap());
        let err = w.fetch(&post).await.unwrap_err();

        assert!(matches!(err, Error::Fetch(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_push_builds_two_action_notification() {
        let (store, _dir) = store();
        let w = worker("v1", &store, &network());

        match w.handle_event(Event::Push(None)).await.unwrap() {
            EventOutcome::Notification(n) => {
                assert_eq!(n.title, "Weather update");
                assert_eq!(n.body, DEFAULT_PUSH_BODY);
                assert_eq!(
                    n.actions,
                    vec![NotificationAction::View, NotificationAction::Dismiss]
                );
            }
            other => panic!("Expected Notification, got {:?}", other),
        }

        match w
            .handle_event(Event::Push(Some("Storm warning".to_string())))
            .await
            .unwrap()
        {
            EventOutcome::Notification(n) => assert_eq!(n.body, "Storm warning"),
            other => panic!("Expected Notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_view_navigates_existing_client_to_root() {
        let (store, _dir) = store();
        let w = worker("v1", &store, &network());
        let mut page = w.clients().connect(None);

        let outcome = w
            .handle_event(Event::NotificationClick(NotificationAction::View))
            .await
            .unwrap();

        match outcome {
            EventOutcome::Navigated { client, url } => {
                assert_eq!(client, page.id);
                assert_eq!(url, INDEX);
            }
            other => panic!("Expected Navigated, got {:?}", other),
        }
        assert!(matches!(
            page.messages.recv().await.unwrap(),
            ClientMessage::Navigate { .. }
        ));
    }

    #[tokio::test]
    async fn test_view_without_clients_opens_one() {
        let (store, _dir) = store();
        let w = worker("v1", &store, &network());

        let outcome = w
            .handle_event(Event::NotificationClick(NotificationAction::View))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Navigated { .. }));
        assert_eq!(w.clients().list().len(), 1);
    }

    #[tokio::test]
    async fn test_dismiss_does_nothing_else() {
        let (store, _dir) = store();
        let w = worker("v1", &store, &network());

        let outcome = w
            .handle_event(Event::NotificationClick(NotificationAction::Dismiss))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Dismissed));
        assert!(w.clients().list().is_empty());
    }

    #[tokio::test]
    async fn test_sync_broadcasts_only_for_configured_tag() {
        let (store, _dir) = store();
        let w = worker("v1", &store, &network());
        let mut page = w.clients().connect(None);

        let ignored = w.handle_event(Event::Sync("other".to_string())).await.unwrap();
        assert!(matches!(ignored, EventOutcome::Ignored));

        let outcome = w
            .handle_event(Event::Sync("weather-sync".to_string()))
            .await
            .unwrap();
        match outcome {
            EventOutcome::Broadcast { tag, recipients } => {
                assert_eq!(tag, "weather-sync");
                assert_eq!(recipients, 1);
            }
            other => panic!("Expected Broadcast, got {:?}", other),
        }
        assert!(matches!(
            page.messages.recv().await.unwrap(),
            ClientMessage::SyncComplete { .. }
        ));
        assert!(store.list_namespaces().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_uses_persisted_active_version() {
        let (store, _dir) = store();
        let network = network();
        worker("v1", &store, &network).register().await.unwrap();

        let later = worker("v1", &store, &network);
        assert!(later.controller_version().is_none());
        assert_eq!(later.resume().unwrap().as_deref(), Some("v1"));
        assert_eq!(later.controller_version().as_deref(), Some("v1"));
    }
}
