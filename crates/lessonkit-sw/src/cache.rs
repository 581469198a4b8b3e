//! Cache API: named caches of request → response pairs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use lessonkit_net::{Request, Response};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::ServiceWorkerError;

/// Cache storage shared between concurrently running fetch handlers.
pub type SharedCacheStorage = Arc<RwLock<CacheStorage>>;

// ==================== Cache ====================

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Normalized request key (method + URL).
    pub key: String,

    /// Stored response.
    pub response: Response,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Create an entry for a request/response pair.
    pub fn new(request: &Request, response: Response) -> Self {
        Self {
            key: request.cache_key(),
            response,
            cached_at: now_millis(),
        }
    }

    /// Produce the response handed to a page, marked as served from cache.
    pub fn to_response(&self) -> Response {
        let mut response = self.response.clone();
        response.from_cache = true;
        response
    }
}

/// A cache instance.
///
/// Keys keep insertion order; `put` on an existing key moves it to the back,
/// as `Cache.put` deletes the old pair before adding the new one.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries.
    entries: HashMap<String, CacheEntry>,

    /// Keys, oldest first.
    order: VecDeque<String>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries.get(&request.cache_key())
    }

    /// Match by raw key.
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store a response for a request.
    pub fn put(&mut self, request: &Request, response: Response) {
        let entry = CacheEntry::new(request, response);
        if self.entries.contains_key(&entry.key) {
            self.order.retain(|k| k != &entry.key);
        }
        self.order.push_back(entry.key.clone());
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Key of the oldest-inserted entry.
    pub fn oldest_key(&self) -> Option<&str> {
        self.order.front().map(|s| s.as_str())
    }

    /// All keys, oldest first.
    pub fn keys(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// Cache storage (the `caches` global).
#[derive(Debug)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,

    /// When false, every open fails (storage disabled or over quota).
    available: bool,
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self {
            caches: HashMap::new(),
            available: true,
        }
    }
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage wrapped for sharing.
    pub fn shared() -> SharedCacheStorage {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Mark storage as (un)available.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    fn check_available(&self, name: &str) -> Result<(), ServiceWorkerError> {
        if self.available {
            Ok(())
        } else {
            Err(ServiceWorkerError::CacheUnavailable(name.to_string()))
        }
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> Result<&mut Cache, ServiceWorkerError> {
        self.check_available(name)?;
        Ok(self
            .caches
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(namespace = name, "Cache created");
                Cache::new(name)
            }))
    }

    /// Look up a request in one cache without creating it.
    pub fn lookup(&self, name: &str, request: &Request) -> Result<Option<Response>, ServiceWorkerError> {
        self.check_available(name)?;
        let hit = self
            .caches
            .get(name)
            .and_then(|cache| cache.match_request(request))
            .map(CacheEntry::to_response);
        trace!(namespace = name, url = %request.url, hit = hit.is_some(), "Cache lookup");
        Ok(hit)
    }

    /// Store a response, creating the cache lazily.
    pub fn put(
        &mut self,
        name: &str,
        request: &Request,
        response: Response,
    ) -> Result<(), ServiceWorkerError> {
        self.open(name)?.put(request, response);
        trace!(namespace = name, url = %request.url, "Cache write");
        Ok(())
    }

    /// Borrow a cache if it exists.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Mutably borrow a cache if it exists.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Cache> {
        self.caches.get_mut(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Get all cache names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn request(url: &str) -> Request {
        Request::parse_get(url).unwrap()
    }

    fn response(url: &str, body: &'static str) -> Response {
        Response::new(url::Url::parse(url).unwrap(), StatusCode::OK, body)
    }

    #[test]
    fn test_cache() {
        let mut cache = Cache::new("lessonkit-shell-v1");
        let req = request("https://app.example/style.css");
        cache.put(&req, response("https://app.example/style.css", "body{}"));

        assert!(cache.match_request(&req).is_some());
        assert!(cache
            .match_request(&request("https://app.example/other.css"))
            .is_none());
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("v1");
        let req = request("https://app.example/style.css");
        cache.put(&req, response("https://app.example/style.css", ""));

        assert!(cache.delete(&req.cache_key()));
        assert!(cache.match_request(&req).is_none());
        assert!(cache.is_empty());
        assert!(!cache.delete(&req.cache_key()));
    }

    #[test]
    fn test_cache_keys_keep_insertion_order() {
        let mut cache = Cache::new("images");
        for name in ["a", "b", "c"] {
            let url = format!("https://app.example/{}.png", name);
            cache.put(&request(&url), response(&url, ""));
        }

        assert_eq!(cache.oldest_key(), Some("GET https://app.example/a.png"));

        // Re-putting moves the key to the back.
        let url = "https://app.example/a.png";
        cache.put(&request(url), response(url, "new"));
        assert_eq!(
            cache.keys(),
            vec![
                "GET https://app.example/b.png",
                "GET https://app.example/c.png",
                "GET https://app.example/a.png",
            ]
        );
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_entry_marks_from_cache() {
        let req = request("https://app.example/");
        let entry = CacheEntry::new(&req, response("https://app.example/", "<html>"));
        assert!(!entry.response.from_cache);
        assert!(entry.to_response().from_cache);
        assert!(entry.cached_at > 0);
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();

        assert!(!storage.has("v1"));

        storage.open("v1").unwrap();
        assert!(storage.has("v1"));

        assert!(storage.delete("v1"));
        assert!(!storage.has("v1"));
    }

    #[test]
    fn test_lookup_does_not_create_cache() {
        let storage = CacheStorage::new();
        let hit = storage
            .lookup("lessonkit-image-v1", &request("https://app.example/a.png"))
            .unwrap();
        assert!(hit.is_none());
        assert!(!storage.has("lessonkit-image-v1"));
    }

    #[test]
    fn test_unavailable_storage_fails_open() {
        let mut storage = CacheStorage::new();
        storage.set_available(false);

        assert!(matches!(
            storage.open("v1"),
            Err(ServiceWorkerError::CacheUnavailable(_))
        ));
        assert!(storage
            .lookup("v1", &request("https://app.example/"))
            .is_err());
    }

    #[test]
    fn test_storage_keys_sorted() {
        let mut storage = CacheStorage::new();
        storage.open("b").unwrap();
        storage.open("a").unwrap();
        assert_eq!(storage.keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
