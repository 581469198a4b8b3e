//! Registration, worker states and controlled clients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use lessonkit_net::{Fetcher, Request};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use url::Url;

use crate::cache::{CacheStorage, SharedCacheStorage};
use crate::router::PassThroughReason;
use crate::worker::{FetchOutcome, ServiceWorker, WorkerConfig};
use crate::{ServiceWorkerError, ServiceWorkerId};

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceWorkerState {
    /// Initial state, worker constructed.
    #[default]
    Parsed,
    /// Installing (pre-warming the shell).
    Installing,
    /// Installed, ready to activate.
    Installed,
    /// Activating (cleaning up old caches).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

impl std::fmt::Display for ServiceWorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceWorkerState::Parsed => "parsed",
            ServiceWorkerState::Installing => "installing",
            ServiceWorkerState::Installed => "installed",
            ServiceWorkerState::Activating => "activating",
            ServiceWorkerState::Activated => "activated",
            ServiceWorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Lifecycle events.
#[derive(Debug, Clone)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A superseded cache was deleted during activation.
    CacheDeleted { name: String },
    /// A client switched controller.
    ControllerChange {
        client_id: String,
        worker_id: ServiceWorkerId,
    },
}

// ==================== Clients ====================

/// A window within the registration scope.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,
    /// Client URL.
    pub url: Url,
    /// Worker controlling this client, if any.
    pub controller: Option<ServiceWorkerId>,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new uncontrolled window and return its ID.
    pub fn add_window(&mut self, url: Url) -> String {
        let id = next_client_id();
        self.add(Client {
            id: id.clone(),
            url,
            controller: None,
        });
        id
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Make `worker` the controller of every client.
    ///
    /// Returns the IDs of the clients whose controller changed.
    pub fn claim(&mut self, worker: ServiceWorkerId) -> Vec<String> {
        let mut changed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.controller != Some(worker))
            .map(|c| {
                c.controller = Some(worker);
                c.id.clone()
            })
            .collect();
        changed.sort();
        changed
    }

    /// Number of clients controlled by `worker`.
    pub fn controlled_by(&self, worker: ServiceWorkerId) -> usize {
        self.clients
            .values()
            .filter(|c| c.controller == Some(worker))
            .count()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are tracked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

// ==================== Registration ====================

/// A service worker registration for one scope.
///
/// Holds the shared cache storage and clients across worker versions. A new
/// version installs, skips waiting and activates immediately; the version it
/// replaces becomes redundant.
pub struct Registration {
    /// Scope URL.
    pub scope: Url,

    caches: SharedCacheStorage,
    clients: Arc<RwLock<Clients>>,
    active: RwLock<Option<Arc<ServiceWorker>>>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl Registration {
    /// Create a registration with fresh cache storage.
    pub fn new(scope: Url) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        Self::with_caches(scope, CacheStorage::shared())
    }

    /// Create a registration over existing cache storage.
    pub fn with_caches(
        scope: Url,
        caches: SharedCacheStorage,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                scope,
                caches,
                clients: Arc::new(RwLock::new(Clients::new())),
                active: RwLock::new(None),
                event_tx,
            },
            event_rx,
        )
    }

    /// Shared cache storage.
    pub fn caches(&self) -> SharedCacheStorage {
        self.caches.clone()
    }

    /// Shared clients.
    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        self.clients.clone()
    }

    /// The active worker, if any.
    pub async fn active(&self) -> Option<Arc<ServiceWorker>> {
        self.active.read().await.clone()
    }

    /// Install and activate a new worker version.
    ///
    /// On install failure the current active worker keeps control.
    pub async fn register(
        &self,
        config: WorkerConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Arc<ServiceWorker>, ServiceWorkerError> {
        let worker = Arc::new(ServiceWorker::new(
            config,
            self.caches.clone(),
            fetcher,
            self.event_tx.clone(),
        ));
        info!(scope = %self.scope, worker = %worker.id, "Registering service worker");

        worker.install().await?;
        worker.activate(&self.clients).await?;

        let previous = self.active.write().await.replace(worker.clone());
        if let Some(previous) = previous {
            previous.set_state(ServiceWorkerState::Redundant).await;
        }

        Ok(worker)
    }

    /// Open a window in scope; it is controlled when a worker is active.
    pub async fn add_client(&self, url: Url) -> Client {
        let controller = self.active().await.map(|w| w.id);
        let client = Client {
            id: next_client_id(),
            url,
            controller,
        };
        debug!(client = %client.id, controlled = controller.is_some(), "Client added");
        self.clients.write().await.add(client.clone());
        client
    }

    /// Route a fetch to the active worker.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, ServiceWorkerError> {
        match self.active().await {
            Some(worker) => worker.handle_fetch(request).await,
            None => Ok(FetchOutcome::PassThrough(PassThroughReason::NoController)),
        }
    }
}
