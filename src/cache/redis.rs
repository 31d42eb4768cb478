//! Redis-backed image cache.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::{ConnectionLike, ConnectionManager};
use tracing::warn;

use super::{CacheError, ImageCache};
use crate::model::ImageKey;

/// Image cache stored in Redis, every entry written with a fixed TTL.
///
/// In production `C` is a [`ConnectionManager`], which multiplexes one
/// connection and reconnects on its own; clones are cheap and share that
/// connection. Any other cloneable async connection works too.
#[derive(Clone)]
pub struct RedisImageCache<C = ConnectionManager> {
    conn: C,
    ttl_secs: u64,
}

impl RedisImageCache<ConnectionManager> {
    /// Connects to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Redis`] if the URL does not parse or the initial
    /// connection fails.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(conn, ttl))
    }
}

impl<C> RedisImageCache<C> {
    /// Wraps an established connection. Entries are written with `ttl`.
    pub fn with_connection(conn: C, ttl: Duration) -> Self {
        Self {
            conn,
            ttl_secs: ttl_seconds(ttl),
        }
    }
}

// SETEX rejects a zero expiry.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl<C> ImageCache for RedisImageCache<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &ImageKey) -> Option<Bytes> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<Vec<u8>>>(key.as_str()).await {
            Ok(data) => data.map(Bytes::from),
            Err(e) => {
                warn!(key = %key, error = %e, "error reading from cache");
                None
            }
        }
    }

    async fn contains(&self, key: &ImageKey) -> bool {
        let mut conn = self.conn.clone();
        match conn.exists::<_, bool>(key.as_str()).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "error reading from cache");
                false
            }
        }
    }

    async fn put(&self, key: &ImageKey, data: Bytes) -> bool {
        let mut conn = self.conn.clone();
        match conn
            .set_ex::<_, _, ()>(key.as_str(), data.as_ref(), self.ttl_secs)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "error saving to cache");
                false
            }
        }
    }
}
