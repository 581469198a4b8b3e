//! # LessonKit Service Worker
//!
//! The offline half of the LessonKit agent: a service worker that pre-warms an
//! app-shell cache, routes intercepted requests to one of three fetch strategies
//! and keeps the image cache bounded.
//!
//! ## Features
//!
//! - **Lifecycle**: install (pre-warm shell), activate (drop superseded caches),
//!   skip-waiting and clients-claim
//! - **Cache API**: versioned namespaces keyed by request identity
//! - **Routing**: pass-through rules plus app-shell / image / runtime classes
//! - **Strategies**: cache-first, cache-first-bounded, stale-while-revalidate
//! - **Eviction**: FIFO trimming of the image namespace
//!
//! ## Architecture
//!
//! ```text
//! Registration (scope, clients)
//!     │
//!     └── ServiceWorker (active)
//!             ├── Router ── classify(request) ──→ Route
//!             ├── CacheFirst            (shell namespace)
//!             ├── CacheFirstBounded     (image namespace) ──→ trim_cache
//!             └── StaleWhileRevalidate  (runtime namespace)
//!
//! CacheStorage
//!     └── Cache (insertion ordered)
//!             └── Request key → Response
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use lessonkit_net::NetError;
use thiserror::Error;

pub mod cache;
pub mod eviction;
pub mod lifecycle;
pub mod namespace;
pub mod router;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{Cache, CacheEntry, CacheStorage, SharedCacheStorage};
pub use eviction::trim_cache;
pub use lifecycle::{Client, Clients, Registration, ServiceWorkerEvent, ServiceWorkerState};
pub use namespace::{CacheNamespace, CacheRole, CacheVersions};
pub use router::{classify, PassThroughReason, RequestClass, Route, RouterConfig};
pub use strategy::{CacheFirst, CacheFirstBounded, FetchStrategy, StaleWhileRevalidate};
pub use worker::{FetchOutcome, ServiceWorker, WorkerConfig};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Cache storage unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("State error: {0}")]
    StateError(String),
}

// ==================== Types ====================

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ServiceWorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}
