//! Open client connections and the messages broadcast to them

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

pub type ClientId = u64;

/// Capacity of the per-client message buffer
const CHANNEL_CAPACITY: usize = 64;

/// Messages posted to open clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// A new version took control of every open client
    ControllerChanged { version: String },
    /// Connectivity came back and the background sync fired
    SyncComplete { tag: String, at: DateTime<Utc> },
    /// Ask one client to navigate
    Navigate { client: ClientId, url: String },
}

/// Snapshot of one open client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: ClientId,
    /// Version serving this client's requests, if any
    pub controller: Option<String>,
}

/// Handle given to a newly connected client
pub struct ClientConnection {
    pub id: ClientId,
    pub messages: broadcast::Receiver<ClientMessage>,
}

pub struct ClientRegistry {
    clients: Mutex<Vec<Client>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<ClientMessage>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            tx,
        }
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, controlled by `controller` if a version is active
    pub fn connect(&self, controller: Option<String>) -> ClientConnection {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let messages = self.tx.subscribe();
        if let Ok(mut clients) = self.clients.lock() {
            clients.push(Client { id, controller });
        }
        log::debug!("Client {} connected", id);
        ClientConnection { id, messages }
    }

    pub fn list(&self) -> Vec<Client> {
        self.clients
            .lock()
            .map(|clients| clients.clone())
            .unwrap_or_default()
    }

    /// Whether any open client is controlled by a version other than `version`
    pub fn has_clients_controlled_by_other(&self, version: &str) -> bool {
        self.list()
            .iter()
            .any(|c| c.controller.as_deref().is_some_and(|v| v != version))
    }

    /// Hand every open client to `version` and tell them. Returns the number claimed.
    pub fn claim(&self, version: &str) -> usize {
        let claimed = match self.clients.lock() {
            Ok(mut clients) => {
                for client in clients.iter_mut() {
                    client.controller = Some(version.to_string());
                }
                clients.len()
            }
            Err(_) => 0,
        };

        self.broadcast(ClientMessage::ControllerChanged {
            version: version.to_string(),
        });
        claimed
    }

    /// Post a message to every open client. Returns how many receivers got it.
    pub fn broadcast(&self, message: ClientMessage) -> usize {
        // No receivers is not an error: nobody is listening
        self.tx.send(message).unwrap_or(0)
    }
}
