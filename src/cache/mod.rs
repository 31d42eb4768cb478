//! Caching layer: the store resized images are written to and served from.
//!
//! The engine only ever talks to [`ImageCache`]; which backend sits behind it
//! is decided once, at startup, by [`build_cache`].
//!
//! | Backend            | Capacity                 | Expiry                     |
//! |--------------------|--------------------------|----------------------------|
//! | [`LruImageCache`]  | fixed entry count, LRU   | none                       |
//! | [`RedisImageCache`]| bounded by the server    | `SVC_IMG_CACHE_TTL_SECS`   |
//!
//! Backend failures after startup are never fatal: reads degrade to a miss and
//! writes report `false`, both with a log line.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::info;

use crate::config::{CacheBackend, ServiceSettings};
use crate::model::ImageKey;

pub mod memory;
pub mod redis;

pub use self::memory::LruImageCache;
pub use self::redis::RedisImageCache;

/// Errors raised while constructing a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache capacity must be greater than zero")]
    ZeroCapacity,

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Key → bytes store shared by the synchronous and background resize paths.
///
/// Implementations are internally synchronized; callers issue concurrent
/// reads and writes without any external locking.
#[async_trait]
pub trait ImageCache: Send + Sync {
    /// Returns the stored payload, or `None` on a miss or backend error.
    async fn get(&self, key: &ImageKey) -> Option<Bytes>;

    /// Returns `true` iff a previously stored payload is retrievable.
    async fn contains(&self, key: &ImageKey) -> bool;

    /// Stores or overwrites `data` under `key`.
    ///
    /// Returns `false` when the backend could not store the entry.
    async fn put(&self, key: &ImageKey, data: Bytes) -> bool;
}

/// Builds the backend selected by `settings.cache_backend`.
///
/// # Errors
///
/// Returns [`CacheError::ZeroCapacity`] for an empty LRU and
/// [`CacheError::Redis`] if the Redis URL is invalid or the server cannot be
/// reached.
pub async fn build_cache(settings: &ServiceSettings) -> Result<Arc<dyn ImageCache>, CacheError> {
    match settings.cache_backend {
        CacheBackend::Memory => {
            info!(capacity = settings.image_cache_size, "using in-memory LRU image cache");
            Ok(Arc::new(LruImageCache::new(settings.image_cache_size)?))
        }
        CacheBackend::Redis => {
            let url = settings.redis_url();
            info!(url = %url, ttl = ?settings.image_cache_ttl, "using redis image cache");
            let cache = RedisImageCache::connect(&url, settings.image_cache_ttl).await?;
            Ok(Arc::new(cache))
        }
    }
}
