//! The resize engine.
//!
//! [`Resizer`] turns a [`ResizeRequest`] into one [`ResizeOutcome`] per URL,
//! either inline ([`Resizer::process`]) or by handing the work to a pool of
//! background workers ([`Resizer::process_async`]).
//!
//! Every image is identified by its [`ImageKey`]. A key already present in
//! the cache is never fetched again. On the background path the key is
//! claimed in [`ResizingProgress`] before a job is queued and released when
//! the job ends, so at most one background resize per key is ever
//! outstanding and readers can wait for it to land.
//!
//! ```text
//!  process_async ──► cached? ──► claim ──► try_push ──► worker ──► fetch ─► resize ─► put ─► release
//!                       │           │          │
//!                     success    enqueued   failure + release
//! ```

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::background::{JobQueue, PushError, WorkerPool};
use crate::cache::ImageCache;
use crate::config::Settings;
use crate::model::{ImageKey, ResizeOutcome, ResizeRequest};

pub mod fetch;
pub mod progress;
pub mod transform;

pub use fetch::Fetcher;
pub use progress::ResizingProgress;

/// Errors produced while resizing a single image, or a whole batch.
#[derive(Debug, Error)]
pub enum ResizeError {
    #[error("image fetch failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("non-success status: {0}")]
    Status(u16),

    #[error("image exceeds maximum size of {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: u64 },

    #[error("failed to decode jpeg: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to jpeg encode resized image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("resize task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("output of {width}x{height} exceeds the limit of {max_pixels} pixels")]
    OutputTooLarge { width: u32, height: u32, max_pixels: u64 },

    #[error("async resize is disabled")]
    AsyncDisabled,
}

/// Settings the engine reads after construction.
#[derive(Debug, Clone)]
pub struct ResizerConfig {
    pub async_enabled: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Largest output image, in pixels, a request may ask for.
    pub max_output_pixels: u64,
}

impl From<&Settings> for ResizerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            async_enabled: settings.service.async_resize,
            workers: settings.service.resize_workers,
            queue_capacity: settings.service.resize_queue_size,
            max_output_pixels: settings.service.max_output_pixels,
        }
    }
}

/// One queued background resize.
#[derive(Debug, Clone)]
struct ResizeJob {
    key: ImageKey,
    url: String,
    width: u32,
    height: u32,
}

/// Fetch → resize → store for one image. Shared by the caller's task and the
/// workers; holds no mutable state of its own.
#[derive(Clone)]
struct Pipeline {
    fetcher: Fetcher,
    cache: Arc<dyn ImageCache>,
    max_output_pixels: u64,
}

impl Pipeline {
    async fn run(
        &self,
        key: &ImageKey,
        url: &str,
        width: u32,
        height: u32,
    ) -> Result<ResizeOutcome, ResizeError> {
        if self.cache.contains(key).await {
            return Ok(ResizeOutcome::success(key.clone(), true));
        }

        let data = self.fetch_and_resize(url, width, height).await?;

        debug!(key = %key, bytes = data.len(), "caching");
        if !self.cache.put(key, data).await {
            warn!(key = %key, "resized image could not be cached");
        }

        Ok(ResizeOutcome::success(key.clone(), false))
    }

    async fn fetch_and_resize(&self, url: &str, width: u32, height: u32) -> Result<Bytes, ResizeError> {
        let source = self.fetcher.fetch(url).await?;
        let max_pixels = self.max_output_pixels;
        tokio::task::spawn_blocking(move || transform::resize_jpeg(&source, width, height, max_pixels))
            .await?
    }
}

/// Image resizing engine with a synchronous and a background path.
///
/// Build one per process, call [`start`](Self::start) once, and call
/// [`shutdown`](Self::shutdown) before exiting.
pub struct Resizer {
    config: ResizerConfig,
    pipeline: Pipeline,
    progress: Arc<ResizingProgress>,
    queue: JobQueue<ResizeJob>,
    pool: Mutex<Option<WorkerPool>>,
}

impl Resizer {
    /// Creates an engine storing results in `cache`.
    ///
    /// No workers run until [`start`](Self::start) is called.
    pub fn new(
        config: ResizerConfig,
        cache: Arc<dyn ImageCache>,
        fetcher: Fetcher,
        progress: Arc<ResizingProgress>,
    ) -> Self {
        let queue = JobQueue::bounded(config.queue_capacity);
        let pipeline = Pipeline {
            fetcher,
            cache,
            max_output_pixels: config.max_output_pixels,
        };
        Self {
            config,
            pipeline,
            progress,
            queue,
            pool: Mutex::new(None),
        }
    }

    /// Builds an engine from process settings.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError::Request`] if the outbound HTTP client cannot be built.
    pub fn from_settings(settings: &Settings, cache: Arc<dyn ImageCache>) -> Result<Self, ResizeError> {
        let fetcher = Fetcher::new(
            settings.http.client_user_agent.clone(),
            settings.http.client_read_timeout,
            settings.service.max_image_size,
        )?;
        let progress = Arc::new(ResizingProgress::new(settings.service.image_resize_timeout));
        Ok(Self::new(ResizerConfig::from(settings), cache, fetcher, progress))
    }

    /// The in-flight tracker, for callers that need to wait on a key.
    pub fn progress(&self) -> &Arc<ResizingProgress> {
        &self.progress
    }

    /// Whether [`process_async`](Self::process_async) is available.
    pub fn is_async_enabled(&self) -> bool {
        self.config.async_enabled
    }

    /// Starts the background worker pool.
    ///
    /// Does nothing when the async path is disabled or the pool is already
    /// running. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if !self.config.async_enabled {
            return;
        }
        let mut pool = self.pool.lock();
        if pool.is_some() {
            return;
        }

        info!(workers = self.config.workers, queue = self.config.queue_capacity, "async resizing enabled");

        let pipeline = self.pipeline.clone();
        let progress = Arc::clone(&self.progress);
        *pool = Some(WorkerPool::spawn(self.config.workers, &self.queue, move |job: ResizeJob| {
            let pipeline = pipeline.clone();
            let progress = Arc::clone(&progress);
            async move {
                if let Err(e) = pipeline.run(&job.key, &job.url, job.width, job.height).await {
                    warn!(url = %job.url, key = %job.key, error = %e, "background resize failed");
                }
                progress.delete_resizing(&job.key);
            }
        }));
    }

    /// Stops accepting background jobs and waits for the workers to finish
    /// everything already queued.
    ///
    /// A no-op when the async path is disabled. Jobs that were queued but
    /// never picked up because the pool was not started have their claims
    /// released.
    pub async fn shutdown(&self) {
        if !self.config.async_enabled {
            return;
        }

        self.queue.close();

        let pool = self.pool.lock().take();
        match pool {
            Some(pool) => {
                debug!(workers = pool.size(), "waiting for resize workers to drain");
                pool.join().await;
            }
            None => {
                for job in self.queue.drain() {
                    self.progress.delete_resizing(&job.key);
                }
            }
        }
        info!("resizer stopped");
    }

    /// Resizes every URL in `request` before returning.
    ///
    /// Outcomes are in input order. A URL whose fetch or transform fails
    /// yields a failure outcome carrying the error; the rest of the batch
    /// still runs. This path does not take in-flight claims.
    ///
    /// # Errors
    ///
    /// Reserved for batch-wide failures; per-URL errors never surface here.
    pub async fn process(&self, request: &ResizeRequest) -> Result<Vec<ResizeOutcome>, ResizeError> {
        let mut results = Vec::with_capacity(request.urls.len());

        for url in &request.urls {
            let key = ImageKey::derive(url, request.width, request.height);
            let outcome = match self.pipeline.run(&key, url, request.width, request.height).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to resize");
                    ResizeOutcome::failure(key, e)
                }
            };
            results.push(outcome);
        }

        Ok(results)
    }

    /// Queues every URL in `request` for background resizing and returns
    /// without waiting for any of them.
    ///
    /// Per URL, in input order:
    ///
    /// - already cached → `success`, `cached: true`;
    /// - already being resized → `enqueued` (no second job);
    /// - queued → `enqueued`;
    /// - queue full → `failure`, and the claim is released at once.
    ///
    /// # Errors
    ///
    /// [`ResizeError::AsyncDisabled`] when the engine was configured without
    /// the async path.
    pub async fn process_async(&self, request: &ResizeRequest) -> Result<Vec<ResizeOutcome>, ResizeError> {
        if !self.config.async_enabled {
            return Err(ResizeError::AsyncDisabled);
        }

        let mut results = Vec::with_capacity(request.urls.len());

        for url in &request.urls {
            let key = ImageKey::derive(url, request.width, request.height);

            if self.pipeline.cache.contains(&key).await {
                results.push(ResizeOutcome::success(key, true));
                continue;
            }

            if self.progress.check_and_set_resizing(&key) {
                results.push(ResizeOutcome::enqueued(key));
                continue;
            }

            let job = ResizeJob {
                key: key.clone(),
                url: url.clone(),
                width: request.width,
                height: request.height,
            };

            match self.queue.try_push(job) {
                Ok(()) => results.push(ResizeOutcome::enqueued(key)),
                Err(e) => {
                    if matches!(e, PushError::Full(_)) {
                        warn!(url = %url, "image resize queue full, try later");
                    }
                    // No worker will ever see this key.
                    self.progress.delete_resizing(&key);
                    let reason = match e {
                        PushError::Full(_) => "resize queue is full",
                        PushError::Closed(_) => "resizer is shutting down",
                    };
                    results.push(ResizeOutcome::failure(key, reason));
                }
            }
        }

        Ok(results)
    }
}
