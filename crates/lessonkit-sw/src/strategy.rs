//! Fetch strategies.
//!
//! Every strategy answers `handle(request) -> Option<Response>`; `None` means
//! the page gets no response (an image that fails soft, or a runtime request
//! with nothing cached and no network).

use std::sync::Arc;

use async_trait::async_trait;
use lessonkit_net::{Fetcher, Request, Response};
use tracing::{debug, warn};

use crate::cache::SharedCacheStorage;
use crate::eviction::trim_cache;
use crate::ServiceWorkerError;

/// A way of answering an intercepted request.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Produce a response for the request.
    async fn handle(&self, request: &Request) -> Result<Option<Response>, ServiceWorkerError>;
}

// ==================== Cache First ====================

/// Cache-first with refill, used for the app shell.
///
/// Lookup or network failures propagate: a shell miss while offline is a
/// failed navigation.
pub struct CacheFirst {
    caches: SharedCacheStorage,
    fetcher: Arc<dyn Fetcher>,
    namespace: String,
}

impl CacheFirst {
    pub fn new(caches: SharedCacheStorage, fetcher: Arc<dyn Fetcher>, namespace: impl Into<String>) -> Self {
        Self {
            caches,
            fetcher,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl FetchStrategy for CacheFirst {
    fn name(&self) -> &'static str {
        "cache-first"
    }

    async fn handle(&self, request: &Request) -> Result<Option<Response>, ServiceWorkerError> {
        let cached = self.caches.read().await.lookup(&self.namespace, request)?;
        if let Some(response) = cached {
            debug!(url = %request.url, namespace = %self.namespace, "Shell cache hit");
            return Ok(Some(response));
        }

        let response = self.fetcher.fetch(request).await?;
        if response.ok() {
            self.caches
                .write()
                .await
                .put(&self.namespace, request, response.clone())?;
            debug!(url = %request.url, namespace = %self.namespace, "Shell cache refilled");
        }
        Ok(Some(response))
    }
}

// ==================== Cache First Bounded ====================

/// Cache-first for images with FIFO trimming after every write.
///
/// Images are never revalidated once cached. Network failures fail soft.
pub struct CacheFirstBounded {
    caches: SharedCacheStorage,
    fetcher: Arc<dyn Fetcher>,
    namespace: String,
    max_items: usize,
}

impl CacheFirstBounded {
    pub fn new(
        caches: SharedCacheStorage,
        fetcher: Arc<dyn Fetcher>,
        namespace: impl Into<String>,
        max_items: usize,
    ) -> Self {
        Self {
            caches,
            fetcher,
            namespace: namespace.into(),
            max_items,
        }
    }

    /// Storage is gone: go straight to the network without caching.
    async fn network_only(&self, request: &Request) -> Option<Response> {
        match self.fetcher.fetch(request).await {
            Ok(response) => Some(response),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Image fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl FetchStrategy for CacheFirstBounded {
    fn name(&self) -> &'static str {
        "cache-first-bounded"
    }

    async fn handle(&self, request: &Request) -> Result<Option<Response>, ServiceWorkerError> {
        let lookup = self.caches.read().await.lookup(&self.namespace, request);
        let cached = match lookup {
            Ok(cached) => cached,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Image cache unavailable, fetching directly");
                return Ok(self.network_only(request).await);
            }
        };
        if let Some(response) = cached {
            debug!(url = %request.url, "Image cache hit");
            return Ok(Some(response));
        }

        let response = match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Image fetch failed");
                return Ok(None);
            }
        };

        if response.ok() {
            let stored = self
                .caches
                .write()
                .await
                .put(&self.namespace, request, response.clone());
            match stored {
                Ok(()) => {
                    if let Err(e) = trim_cache(&self.caches, &self.namespace, self.max_items).await {
                        warn!(namespace = %self.namespace, error = %e, "Image cache trim failed");
                    }
                }
                Err(e) => warn!(url = %request.url, error = %e, "Image not cached"),
            }
        }
        Ok(Some(response))
    }
}

// ==================== Stale While Revalidate ====================

/// Stale-while-revalidate for everything else.
///
/// A cached response is returned at once while a spawned task refreshes the
/// cache. With nothing cached the caller waits for the network; if that fails
/// too the result is `None`, never an error.
pub struct StaleWhileRevalidate {
    caches: SharedCacheStorage,
    fetcher: Arc<dyn Fetcher>,
    namespace: String,
}

impl StaleWhileRevalidate {
    pub fn new(caches: SharedCacheStorage, fetcher: Arc<dyn Fetcher>, namespace: impl Into<String>) -> Self {
        Self {
            caches,
            fetcher,
            namespace: namespace.into(),
        }
    }
}

/// Fetch and, on success, store a copy. Failures are swallowed.
async fn revalidate(
    caches: SharedCacheStorage,
    fetcher: Arc<dyn Fetcher>,
    namespace: String,
    request: Request,
) -> Option<Response> {
    let response = match fetcher.fetch(&request).await {
        Ok(response) => response,
        Err(e) => {
            debug!(url = %request.url, error = %e, "Revalidation fetch failed");
            return None;
        }
    };

    if response.ok() {
        let stored = caches.write().await.put(&namespace, &request, response.clone());
        match stored {
            Ok(()) => debug!(url = %request.url, namespace = %namespace, "Runtime cache refreshed"),
            Err(e) => debug!(url = %request.url, error = %e, "Runtime cache not refreshed"),
        }
    }
    Some(response)
}

#[async_trait]
impl FetchStrategy for StaleWhileRevalidate {
    fn name(&self) -> &'static str {
        "stale-while-revalidate"
    }

    async fn handle(&self, request: &Request) -> Result<Option<Response>, ServiceWorkerError> {
        let lookup = self.caches.read().await.lookup(&self.namespace, request);
        let cached = match lookup {
            Ok(cached) => cached,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Runtime cache unavailable, fetching directly");
                return Ok(self.fetcher.fetch(request).await.ok());
            }
        };

        let refresh = tokio::spawn(revalidate(
            self.caches.clone(),
            self.fetcher.clone(),
            self.namespace.clone(),
            request.clone(),
        ));

        if let Some(response) = cached {
            debug!(url = %request.url, "Serving stale runtime response");
            return Ok(Some(response));
        }

        match refresh.await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Revalidation task failed");
                Ok(None)
            }
        }
    }
}
