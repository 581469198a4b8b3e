//! FIFO trimming of a bounded cache.

use tracing::debug;

use crate::cache::SharedCacheStorage;
use crate::ServiceWorkerError;

/// Delete oldest-inserted entries from `name` until it holds at most `max_items`.
///
/// The write lock is taken once per deleted entry so concurrent writers to
/// the same cache interleave with the pass instead of waiting for all of it.
/// Returns the number of entries removed; a missing cache removes nothing.
pub async fn trim_cache(
    caches: &SharedCacheStorage,
    name: &str,
    max_items: usize,
) -> Result<usize, ServiceWorkerError> {
    let mut removed = 0;

    loop {
        let mut storage = caches.write().await;
        let Some(cache) = storage.get_mut(name) else {
            break;
        };
        if cache.len() <= max_items {
            break;
        }
        let Some(oldest) = cache.oldest_key().map(str::to_string) else {
            break;
        };
        cache.delete(&oldest);
        removed += 1;
        debug!(namespace = name, key = %oldest, "Evicted cache entry");
    }

    if removed > 0 {
        debug!(namespace = name, removed, max_items, "Cache trimmed");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use http::StatusCode;
    use lessonkit_net::{Request, Response};

    async fn fill(caches: &SharedCacheStorage, name: &str, count: usize) {
        let mut storage = caches.write().await;
        for i in 0..count {
            let url = format!("https://app.example/img/{}.png", i);
            let request = Request::parse_get(&url).unwrap();
            let response = Response::new(request.url.clone(), StatusCode::OK, "png");
            storage.put(name, &request, response).unwrap();
        }
    }

    #[tokio::test]
    async fn test_trim_removes_oldest_first() {
        let caches = CacheStorage::shared();
        fill(&caches, "images", 5).await;

        let removed = trim_cache(&caches, "images", 3).await.unwrap();
        assert_eq!(removed, 2);

        let storage = caches.read().await;
        let keys = storage.get("images").unwrap().keys();
        assert_eq!(
            keys,
            vec![
                "GET https://app.example/img/2.png",
                "GET https://app.example/img/3.png",
                "GET https://app.example/img/4.png",
            ]
        );
    }

    #[tokio::test]
    async fn test_trim_is_idempotent() {
        let caches = CacheStorage::shared();
        fill(&caches, "images", 4).await;

        assert_eq!(trim_cache(&caches, "images", 2).await.unwrap(), 2);
        assert_eq!(trim_cache(&caches, "images", 2).await.unwrap(), 0);
        assert_eq!(caches.read().await.get("images").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_trim_missing_cache() {
        let caches = CacheStorage::shared();
        assert_eq!(trim_cache(&caches, "nope", 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_trim_to_zero_empties_cache() {
        let caches = CacheStorage::shared();
        fill(&caches, "images", 3).await;

        assert_eq!(trim_cache(&caches, "images", 0).await.unwrap(), 3);
        assert!(caches.read().await.get("images").unwrap().is_empty());
    }
}
