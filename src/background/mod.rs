//! Background work: a bounded job queue drained by a fixed pool of tasks.
//!
//! [`JobQueue`] is a bounded multi-producer/multi-consumer FIFO. Producers
//! never wait: [`JobQueue::try_push`] either accepts a job or reports exactly
//! why it could not. [`WorkerPool`] spawns `n` Tokio tasks that pull from the
//! queue until it is closed and empty.
//!
//! ```rust,no_run
//! use imgresize::background::{JobQueue, WorkerPool};
//!
//! # async fn example() {
//! let queue = JobQueue::bounded(64);
//! let pool = WorkerPool::spawn(4, &queue, |job: u32| async move {
//!     tracing::info!(job, "processing");
//! });
//!
//! queue.try_push(7).unwrap();
//! queue.close();
//! pool.join().await;
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Why a job was not accepted. The rejected job is handed back.
#[derive(Debug)]
pub enum PushError<T> {
    Full(T),
    Closed(T),
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "job queue is full"),
            Self::Closed(_) => write!(f, "job queue is closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for PushError<T> {}

/// Bounded FIFO shared by producers and workers.
///
/// Cloning a `JobQueue` yields another handle to the same queue.
pub struct JobQueue<T> {
    // `None` once closed; dropping the last sender lets receivers drain and stop.
    tx: Arc<Mutex<Option<flume::Sender<T>>>>,
    rx: flume::Receiver<T>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
            rx: self.rx.clone(),
        }
    }
}

impl<T> JobQueue<T> {
    /// Creates a queue holding at most `capacity` pending jobs.
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    /// Enqueues `job` without waiting.
    ///
    /// # Errors
    ///
    /// - [`PushError::Full`]: `capacity` jobs are already pending.
    /// - [`PushError::Closed`]: [`close`](Self::close) has been called.
    pub fn try_push(&self, job: T) -> Result<(), PushError<T>> {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return Err(PushError::Closed(job));
        };
        tx.try_send(job).map_err(|e| match e {
            flume::TrySendError::Full(job) => PushError::Full(job),
            flume::TrySendError::Disconnected(job) => PushError::Closed(job),
        })
    }

    /// Stops accepting jobs. Already queued jobs remain available to workers.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Removes and returns every pending job without waiting.
    pub fn drain(&self) -> Vec<T> {
        self.rx.drain().collect()
    }

    // Resolves to `None` once the queue is closed and empty.
    async fn pop(&self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }
}

/// A fixed set of tasks consuming one [`JobQueue`].
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers, each running `handler` on one job at a time.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<T, H, F>(size: usize, queue: &JobQueue<T>, handler: H) -> Self
    where
        T: Send + 'static,
        H: Fn(T) -> F + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let workers = (0..size)
            .map(|id| {
                let queue = queue.clone();
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    debug!(worker = id, "worker started");
                    while let Some(job) = queue.pop().await {
                        handler(job).await;
                    }
                    debug!(worker = id, "worker stopped");
                })
            })
            .collect();
        Self { workers }
    }

    /// Number of spawned workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to exit. Workers exit once their queue is
    /// closed and drained, so close the queue first.
    pub async fn join(self) {
        for (id, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!(worker = id, error = %e, "worker terminated abnormally");
            }
        }
    }
}
