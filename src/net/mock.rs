//! Mock network for testing
//!
//! Serves canned responses per URL and can be switched offline or held
//! behind a gate to observe what completes before the origin answers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::Network;
use crate::error::FetchError;
use crate::http::{Request, Response};

/// Mock origin.
///
/// # Example
/// ```ignore
/// let net = MockNetwork::new().with_route("https://api.test/x", Response::new(200));
/// net.set_offline(true);
/// ```
#[derive(Default)]
pub struct MockNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, url: &str, response: Response) -> Self {
        self.set_route(url, response);
        self
    }

    /// Replace the response served for a URL
    pub fn set_route(&self, url: &str, response: Response) {
        let url = url::Url::parse(url).expect("valid url").to_string();
        self.routes.lock().unwrap().insert(url, response);
    }

    /// Fail every fetch with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every fetch wait until the returned gate is notified
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn calls_to(&self, url: &str) -> usize {
        let url = url::Url::parse(url).expect("valid url").to_string();
        self.calls.lock().unwrap().iter().filter(|c| **c == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.lock().unwrap().push(request.url.to_string());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network("mock network offline".to_string()));
        }

        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Response::new(404)))
    }
}
