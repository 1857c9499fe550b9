//! Bounded worker pool
//!
//! A [`WorkerPool`] runs submitted futures on a [`Spawner`] while enforcing
//! an upper bound on how many of them may be in flight at once. Submissions
//! beyond the bound, or after [`WorkerPool::shutdown`], are rejected instead
//! of queued. Every accepted job is returned as a [`PoolTask`] that can be
//! awaited for its result and cancelled; a job's slot is released as soon as
//! it finishes or is cancelled.

use crate::Spawner;
use futures::channel::oneshot;
use futures::future::{AbortHandle, Abortable};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tracing::debug;

/// Reason a submission was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// The pool or scheduler no longer accepts work
    #[error("executor is shut down")]
    Shutdown,

    /// Every worker slot is busy
    #[error("all {0} workers are busy")]
    Saturated(usize),
}

impl Rejected {
    /// Whether the rejection was caused by a shutdown rather than load
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Rejected::Shutdown)
    }
}

/// Why an accepted job produced no value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The job was cancelled before it finished
    #[error("task was cancelled")]
    Cancelled,

    /// The job panicked
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Bounded pool of concurrently running jobs
pub struct WorkerPool {
    name: String,
    max_workers: usize,
    active: Arc<AtomicUsize>,
    shutdown: AtomicBool,
    spawner: Arc<dyn Spawner>,
}

impl WorkerPool {
    /// Create a pool allowing at most `max_workers` jobs in flight
    ///
    /// A bound of zero is treated as one.
    pub fn new(name: impl Into<String>, max_workers: usize, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            name: name.into(),
            max_workers: max_workers.max(1),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: AtomicBool::new(false),
            spawner,
        }
    }

    /// Submit a job
    ///
    /// Fails immediately with [`Rejected`] when the pool is shut down or
    /// saturated; never waits for a free slot.
    pub fn submit<F, T>(&self, job: F) -> Result<PoolTask<T>, Rejected>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(Rejected::Shutdown);
        }

        let max = self.max_workers;
        if let Err(busy) =
            self.active
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < max).then_some(n + 1)
                })
        {
            return Err(Rejected::Saturated(busy));
        }
        let slot = Slot {
            active: Arc::clone(&self.active),
        };

        let (abort, registration) = AbortHandle::new_pair();
        let (tx, rx) = oneshot::channel();
        let job = Abortable::new(AssertUnwindSafe(job).catch_unwind(), registration);

        self.spawner.spawn(Box::pin(async move {
            // Released on completion, cancellation, or when the runtime drops us
            let slot = slot;
            let outcome = match job.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(panic)) => Err(TaskFailure::Panicked(panic_message(panic))),
                Err(_aborted) => Err(TaskFailure::Cancelled),
            };
            // Free the slot before anyone awaiting the result can observe it
            drop(slot);
            // The receiver may already be gone after a timeout
            let _ = tx.send(outcome);
        }));

        debug!("Submitted job to pool '{}'", self.name);
        Ok(PoolTask { result: rx, abort })
    }

    /// Number of jobs currently holding a worker slot
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Maximum number of concurrent jobs
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting new jobs
    ///
    /// Jobs already running are left to finish or be cancelled by their owners.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("Worker pool '{}' shut down", self.name);
        }
    }

    /// Whether [`WorkerPool::shutdown`] has been called
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("max_workers", &self.max_workers)
            .field("active", &self.active_count())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

struct Slot {
    active: Arc<AtomicUsize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle to a job accepted by a [`WorkerPool`]
///
/// Awaiting the handle yields the job's output. Dropping the handle does not
/// cancel the job; call [`PoolTask::cancel`] for that.
pub struct PoolTask<T> {
    result: oneshot::Receiver<Result<T, TaskFailure>>,
    abort: AbortHandle,
}

impl<T> PoolTask<T> {
    /// Cancel the job, releasing its worker slot
    ///
    /// Has no effect once the job has finished.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// A handle that can cancel the job after this `PoolTask` is gone
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

impl<T> Future for PoolTask<T> {
    type Output = Result<T, TaskFailure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.result).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Sender dropped without a value: the spawned future was dropped
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(TaskFailure::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
