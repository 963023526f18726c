//! Keep-alive scope for fire-and-forget work
//!
//! Background refreshes are spawned onto the runtime and registered here so
//! the owner can wait for them to settle before shutting the runtime down.

use std::future::Future;
use std::sync::Mutex;

use log::debug;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` and keep the scope alive until it completes.
    /// The caller does not wait for it.
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        if let Ok(mut handles) = self.handles.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
    }

    /// Number of registered tasks that have not finished yet
    pub fn pending(&self) -> usize {
        self.handles
            .lock()
            .map(|handles| handles.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Wait for every registered task, including ones registered while waiting.
    pub async fn settle(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = match self.handles.lock() {
                Ok(mut handles) => handles.drain(..).collect(),
                Err(_) => return,
            };
            if batch.is_empty() {
                return;
            }

            debug!("Waiting for {} background task(s)", batch.len());
            for handle in batch {
                if let Err(e) = handle.await {
                    log::warn!("Background task failed: {}", e);
                }
            }
        }
    }
}
