//! The service worker context: install, activate and fetch dispatch.

use std::sync::Arc;

use futures::future::join_all;
use lessonkit_net::{Fetcher, Request, Response};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::SharedCacheStorage;
use crate::lifecycle::{Clients, ServiceWorkerEvent, ServiceWorkerState};
use crate::namespace::{CacheRole, CacheVersions};
use crate::router::{classify, PassThroughReason, RequestClass, Route, RouterConfig};
use crate::strategy::{CacheFirst, CacheFirstBounded, FetchStrategy, StaleWhileRevalidate};
use crate::{ServiceWorkerError, ServiceWorkerId};

/// Everything a worker version needs to know about the build it belongs to.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin the app shell is served from.
    pub origin: Url,
    /// Namespace versions of this build.
    pub versions: CacheVersions,
    /// App-shell asset paths pre-cached on install.
    pub app_shell: Vec<String>,
    /// Maximum number of entries in the image namespace.
    pub max_image_entries: usize,
    /// Request classification rules.
    pub router: RouterConfig,
}

impl WorkerConfig {
    /// GET requests for every app-shell asset.
    pub fn shell_requests(&self) -> Result<Vec<Request>, ServiceWorkerError> {
        self.app_shell
            .iter()
            .map(|path| {
                self.origin
                    .join(path)
                    .map(Request::get)
                    .map_err(|e| ServiceWorkerError::InstallFailed(format!("{}: {}", path, e)))
            })
            .collect()
    }
}

/// What happened to an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The worker did not touch the request; the page goes to the network.
    PassThrough(PassThroughReason),
    /// A strategy answered. `None` means no response could be produced.
    Handled {
        class: RequestClass,
        response: Option<Response>,
    },
}

impl FetchOutcome {
    /// The response produced by a strategy, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Handled { response, .. } => response.as_ref(),
            FetchOutcome::PassThrough(_) => None,
        }
    }
}

/// One version of the service worker.
pub struct ServiceWorker {
    /// Unique ID.
    pub id: ServiceWorkerId,

    config: WorkerConfig,
    state: RwLock<ServiceWorkerState>,
    caches: SharedCacheStorage,
    fetcher: Arc<dyn Fetcher>,

    shell: CacheFirst,
    images: CacheFirstBounded,
    runtime: StaleWhileRevalidate,

    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorker {
    /// Create a worker in the `Parsed` state.
    pub fn new(
        config: WorkerConfig,
        caches: SharedCacheStorage,
        fetcher: Arc<dyn Fetcher>,
        event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
    ) -> Self {
        let shell_ns = config.versions.namespace(CacheRole::Shell);
        let image_ns = config.versions.namespace(CacheRole::Image);
        let runtime_ns = config.versions.namespace(CacheRole::Runtime);

        Self {
            id: ServiceWorkerId::new(),
            shell: CacheFirst::new(caches.clone(), fetcher.clone(), shell_ns.name()),
            images: CacheFirstBounded::new(
                caches.clone(),
                fetcher.clone(),
                image_ns.name(),
                config.max_image_entries,
            ),
            runtime: StaleWhileRevalidate::new(caches.clone(), fetcher.clone(), runtime_ns.name()),
            config,
            state: RwLock::new(ServiceWorkerState::Parsed),
            caches,
            fetcher,
            event_tx,
        }
    }

    /// Current state.
    pub async fn state(&self) -> ServiceWorkerState {
        *self.state.read().await
    }

    /// Worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub(crate) async fn set_state(&self, new_state: ServiceWorkerState) {
        let mut state = self.state.write().await;
        if *state == new_state {
            return;
        }
        let previous = std::mem::replace(&mut *state, new_state);
        drop(state);

        info!(worker = %self.id, from = %previous, to = %new_state, "Service worker state change");
        let _ = self.event_tx.send(ServiceWorkerEvent::StateChange {
            worker_id: self.id,
            new_state,
        });
    }

    async fn fail_install(&self, message: String) -> ServiceWorkerError {
        warn!(worker = %self.id, error = %message, "Install failed");
        self.set_state(ServiceWorkerState::Redundant).await;
        ServiceWorkerError::InstallFailed(message)
    }

    /// Pre-warm the shell namespace.
    ///
    /// Every asset is fetched before anything is written, so one failed asset
    /// leaves the shell namespace untouched and the worker redundant. A
    /// successful install skips waiting: the worker may activate at once.
    pub async fn install(&self) -> Result<(), ServiceWorkerError> {
        let current = self.state().await;
        if current != ServiceWorkerState::Parsed {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot install from {}",
                current
            )));
        }
        self.set_state(ServiceWorkerState::Installing).await;

        let requests = match self.config.shell_requests() {
            Ok(requests) => requests,
            Err(e) => return Err(self.fail_install(e.to_string()).await),
        };

        let results = join_all(requests.iter().map(|r| self.fetcher.fetch(r))).await;

        let mut responses = Vec::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(response) if response.ok() => responses.push(response),
                Ok(response) => {
                    let message = format!("{} returned {}", request.url, response.status);
                    return Err(self.fail_install(message).await);
                }
                Err(e) => {
                    let message = format!("{}: {}", request.url, e);
                    return Err(self.fail_install(message).await);
                }
            }
        }

        let shell = self.config.versions.namespace(CacheRole::Shell);
        let written = {
            let mut storage = self.caches.write().await;
            storage.open(shell.name()).map(|cache| {
                for (request, response) in requests.iter().zip(responses) {
                    cache.put(request, response);
                }
                cache.len()
            })
        };
        match written {
            Ok(count) => info!(worker = %self.id, namespace = %shell, assets = count, "App shell cached"),
            Err(e) => return Err(self.fail_install(e.to_string()).await),
        }

        self.set_state(ServiceWorkerState::Installed).await;
        Ok(())
    }

    /// Delete superseded namespaces and take control of every client.
    ///
    /// Returns the names of the deleted caches.
    pub async fn activate(&self, clients: &RwLock<Clients>) -> Result<Vec<String>, ServiceWorkerError> {
        let current = self.state().await;
        if current != ServiceWorkerState::Installed {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot activate from {}",
                current
            )));
        }
        self.set_state(ServiceWorkerState::Activating).await;

        let deleted = {
            let mut storage = self.caches.write().await;
            let existing = storage.keys();
            let stale: Vec<String> = self
                .config
                .versions
                .stale(&existing)
                .into_iter()
                .map(str::to_string)
                .collect();
            for name in &stale {
                storage.delete(name);
                info!(worker = %self.id, namespace = %name, "Deleted superseded cache");
                let _ = self
                    .event_tx
                    .send(ServiceWorkerEvent::CacheDeleted { name: name.clone() });
            }
            stale
        };

        self.set_state(ServiceWorkerState::Activated).await;

        let claimed = clients.write().await.claim(self.id);
        for client_id in claimed {
            debug!(worker = %self.id, client = %client_id, "Client claimed");
            let _ = self.event_tx.send(ServiceWorkerEvent::ControllerChange {
                client_id,
                worker_id: self.id,
            });
        }

        Ok(deleted)
    }

    fn strategy_for(&self, class: RequestClass) -> &dyn FetchStrategy {
        match class {
            RequestClass::AppShell => &self.shell,
            RequestClass::Image => &self.images,
            RequestClass::Runtime => &self.runtime,
        }
    }

    /// Handle a fetch event.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, ServiceWorkerError> {
        if self.state().await != ServiceWorkerState::Activated {
            return Ok(FetchOutcome::PassThrough(PassThroughReason::NoController));
        }

        match classify(&self.config.router, request) {
            Route::PassThrough(reason) => {
                debug!(url = %request.url, ?reason, "Passing request through");
                Ok(FetchOutcome::PassThrough(reason))
            }
            Route::Intercept(class) => {
                let strategy = self.strategy_for(class);
                debug!(url = %request.url, strategy = strategy.name(), "Intercepting request");
                let response = strategy.handle(request).await?;
                Ok(FetchOutcome::Handled { class, response })
            }
        }
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
