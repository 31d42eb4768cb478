//! In-flight bookkeeping for background resizes.
//!
//! A key is present in [`ResizingProgress`] exactly while a resize for it is
//! outstanding. Each entry holds the sending half of a `watch` channel that is
//! never written to: releasing a key drops the sender, which closes every
//! receiver at once. That closure is the single completion event waiters
//! observe, so a released key can be claimed again immediately with a fresh
//! marker without confusing anyone still waiting on the old one.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::model::ImageKey;

type Marker = watch::Sender<()>;

/// Tracks which image keys currently have a resize in progress.
#[derive(Debug)]
pub struct ResizingProgress {
    resizing: RwLock<HashMap<ImageKey, Marker>>,
    timeout: Duration,
}

impl ResizingProgress {
    /// Creates an empty tracker whose [`wait_for_resizing_done`](Self::wait_for_resizing_done)
    /// gives up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            resizing: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Atomically checks whether `key` is being resized and, if not, claims it.
    ///
    /// Returns `true` when another party already holds the claim; the caller
    /// must not start duplicate work. Returns `false` when the caller now owns
    /// the claim and is responsible for calling [`delete_resizing`](Self::delete_resizing).
    pub fn check_and_set_resizing(&self, key: &ImageKey) -> bool {
        let mut resizing = self.resizing.write();
        if resizing.contains_key(key) {
            return true;
        }
        let (marker, _) = watch::channel(());
        resizing.insert(key.clone(), marker);
        false
    }

    /// Returns `true` if a resize for `key` is outstanding.
    pub fn is_resizing(&self, key: &ImageKey) -> bool {
        self.resizing.read().contains_key(key)
    }

    /// Releases the claim on `key`, waking every waiter. No-op if unclaimed.
    pub fn delete_resizing(&self, key: &ImageKey) {
        let marker = self.resizing.write().remove(key);
        // Dropping the sender outside the lock closes all subscribed receivers.
        drop(marker);
    }

    /// Number of keys currently claimed.
    pub fn len(&self) -> usize {
        self.resizing.read().len()
    }

    /// Whether no key is claimed.
    pub fn is_empty(&self) -> bool {
        self.resizing.read().is_empty()
    }

    /// Waits for an outstanding resize of `key` using the configured timeout.
    ///
    /// See [`wait_for`](Self::wait_for).
    pub async fn wait_for_resizing_done(&self, key: &ImageKey) -> bool {
        self.wait_for(key, self.timeout).await
    }

    /// Blocks until the resize of `key` finishes or `timeout` elapses.
    ///
    /// Returns `true` immediately when nothing is in progress for `key`, `true`
    /// once the claim is released, and `false` if the timeout fires first.
    pub async fn wait_for(&self, key: &ImageKey, timeout: Duration) -> bool {
        // Subscribe while the read guard is held so a concurrent release
        // cannot slip in between the lookup and the subscription.
        let mut done = {
            let resizing = self.resizing.read();
            match resizing.get(key) {
                Some(marker) => marker.subscribe(),
                None => return true,
            }
        };

        debug!(key = %key, "waiting for resize to finish");

        // The marker never sends, so `changed` only resolves once the sender
        // is dropped by `delete_resizing`.
        tokio::time::timeout(timeout, done.changed()).await.is_ok()
    }
}
