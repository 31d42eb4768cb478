//! Bounded in-process image cache.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;

use super::{CacheError, ImageCache};
use crate::model::ImageKey;

/// Thread-safe LRU cache holding at most `capacity` images.
///
/// TTLs are not applied here; entries leave only when evicted by newer ones.
pub struct LruImageCache {
    // A plain Mutex: even reads reorder the recency list.
    inner: Mutex<LruCache<ImageKey, Bytes>>,
}

impl LruImageCache {
    /// Creates a cache bounded to `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ZeroCapacity`] if `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity)?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[async_trait]
impl ImageCache for LruImageCache {
    async fn get(&self, key: &ImageKey) -> Option<Bytes> {
        self.inner.lock().get(key).cloned()
    }

    async fn contains(&self, key: &ImageKey) -> bool {
        self.inner.lock().contains(key)
    }

    async fn put(&self, key: &ImageKey, data: Bytes) -> bool {
        self.inner.lock().put(key.clone(), data);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ImageKey {
        ImageKey::from(s)
    }

    #[tokio::test]
    async fn get_after_put() {
        let cache = LruImageCache::new(10).unwrap();
        assert!(cache.put(&key("a"), Bytes::from_static(b"one")).await);
        assert_eq!(cache.get(&key("a")).await, Some(Bytes::from_static(b"one")));
        assert_eq!(cache.get(&key("b")).await, None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn miss_is_false() {
        let cache = LruImageCache::new(1).unwrap();
        assert!(!cache.contains(&key("missing")).await);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn overwrite_replaces_payload() {
        let cache = LruImageCache::new(4).unwrap();
        cache.put(&key("a"), Bytes::from_static(b"old")).await;
        cache.put(&key("a"), Bytes::from_static(b"new")).await;
        assert_eq!(cache.get(&key("a")).await, Some(Bytes::from_static(b"new")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = LruImageCache::new(2).unwrap();
        cache.put(&key("a"), Bytes::from_static(b"1")).await;
        cache.put(&key("b"), Bytes::from_static(b"2")).await;

        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get(&key("a")).await.is_some());
        cache.put(&key("c"), Bytes::from_static(b"3")).await;

        assert!(cache.contains(&key("a")).await);
        assert!(!cache.contains(&key("b")).await);
        assert!(cache.contains(&key("c")).await);
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(LruImageCache::new(0), Err(CacheError::ZeroCapacity)));
    }
}
