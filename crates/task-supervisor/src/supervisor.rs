//! The timed supervisor and the work it runs

use crate::backoff::Backoff;
use crate::metrics::{MetricsSink, SupervisorStats};
use async_runtime_compat::runtime_utils::sleep;
use async_runtime_compat::{DelayScheduler, Rejected, TaskFailure, WorkerPool};
use async_trait::async_trait;
use futures::future::{self, AbortHandle, Either};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A unit of work run once per supervised cycle
///
/// Implementations must tolerate being abandoned mid-flight: on timeout the
/// future is dropped at its next suspension point.
#[async_trait]
pub trait SupervisedWork: Send + Sync + 'static {
    /// Run the work once
    async fn run(&self) -> anyhow::Result<()>;
}

/// [`SupervisedWork`] backed by a closure
pub struct FnWork<F>(F);

/// Wrap a closure returning a future as [`SupervisedWork`]
pub fn work_fn<F, Fut>(f: F) -> Arc<FnWork<F>>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnWork(f))
}

#[async_trait]
impl<F, Fut> SupervisedWork for FnWork<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

/// Outcome of waiting on one submitted job
enum Outcome {
    Completed,
    Failed(String),
    TimedOut,
    Rejected(Rejected),
}

struct Inner {
    name: String,
    scheduler: Arc<dyn DelayScheduler>,
    pool: Arc<WorkerPool>,
    timeout: Duration,
    backoff: Backoff,
    work: Arc<dyn SupervisedWork>,
    stats: Arc<SupervisorStats>,
    metrics: Arc<dyn MetricsSink>,
    cancelled: AtomicBool,
    in_flight: Mutex<Option<AbortHandle>>,
}

/// Periodic job with a hard timeout and exponential backoff
///
/// Cloning yields another handle to the same supervisor.
#[derive(Clone)]
pub struct TimedSupervisor {
    inner: Arc<Inner>,
}

impl TimedSupervisor {
    /// Create a supervisor and register its stats with `metrics`
    ///
    /// `timeout` is both the per-cycle deadline and the base delay between
    /// cycles; the delay never exceeds `timeout × backoff_bound`. Nothing
    /// runs until [`TimedSupervisor::start`] is called.
    pub fn new(
        name: impl Into<String>,
        scheduler: Arc<dyn DelayScheduler>,
        pool: Arc<WorkerPool>,
        timeout: Duration,
        backoff_bound: u32,
        metrics: Arc<dyn MetricsSink>,
        work: Arc<dyn SupervisedWork>,
    ) -> Self {
        let name = name.into();
        let stats = Arc::new(SupervisorStats::default());
        metrics.register(&name, Arc::clone(&stats));

        Self {
            inner: Arc::new(Inner {
                name,
                scheduler,
                pool,
                timeout,
                backoff: Backoff::new(timeout, backoff_bound),
                work,
                stats,
                metrics,
                cancelled: AtomicBool::new(false),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Supervisor name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Live counters for this supervisor
    pub fn stats(&self) -> Arc<SupervisorStats> {
        Arc::clone(&self.inner.stats)
    }

    /// Whether [`TimedSupervisor::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Schedule the first cycle after `initial_delay`
    ///
    /// Every cycle schedules the next one, so this is called once.
    pub fn start(&self, initial_delay: Duration) -> Result<(), Rejected> {
        if self.is_cancelled() {
            return Err(Rejected::Shutdown);
        }
        info!(
            "Starting supervisor '{}' (timeout {:?}, max delay {:?})",
            self.inner.name,
            self.inner.timeout,
            self.inner.backoff.ceiling()
        );
        let next = self.clone();
        self.inner
            .scheduler
            .schedule(initial_delay, Box::pin(async move { next.run().await }))
    }

    /// Stop the cycle
    ///
    /// Unregisters the stats, prevents any further rescheduling and aborts
    /// the in-flight job if there is one. Calling it again has no effect.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.metrics.unregister(&self.inner.name);
        if let Some(job) = self.take_in_flight() {
            job.abort();
        }
        info!("Supervisor '{}' cancelled", self.inner.name);
    }

    /// Run one supervised cycle, then reschedule
    ///
    /// This is what the scheduler invokes. Never fails: every outcome is
    /// counted and the cycle continues.
    pub async fn run(&self) {
        if self.is_cancelled() {
            return;
        }

        let inner = &self.inner;
        let work = Arc::clone(&inner.work);
        let mut submitted = None;

        let outcome = match inner.pool.submit(async move { work.run().await }) {
            Ok(mut job) => {
                inner.stats.set_pool_used(inner.pool.active_count());
                self.set_in_flight(Some(job.abort_handle()));

                let mut deadline = Box::pin(sleep(inner.timeout));
                let outcome = match future::select(&mut job, deadline.as_mut()).await {
                    Either::Left((Ok(Ok(())), _)) => Outcome::Completed,
                    Either::Left((Ok(Err(e)), _)) => Outcome::Failed(format!("{:#}", e)),
                    Either::Left((Err(TaskFailure::Panicked(msg)), _)) => {
                        Outcome::Failed(format!("panicked: {}", msg))
                    }
                    Either::Left((Err(TaskFailure::Cancelled), _)) => {
                        Outcome::Failed("cancelled".to_string())
                    }
                    Either::Right(_) => Outcome::TimedOut,
                };
                submitted = Some(job);
                outcome
            }
            Err(rejected) => Outcome::Rejected(rejected),
        };

        match outcome {
            Outcome::Completed => {
                inner.backoff.reset();
                inner.stats.set_pool_used(inner.pool.active_count());
                inner.stats.record_success();
                debug!("Supervisor '{}' cycle completed", inner.name);
            }
            Outcome::TimedOut => {
                inner.stats.record_timeout();
                let delay = inner.backoff.on_timeout();
                warn!(
                    "Task supervisor '{}' timed out after {:?}, next run in {:?}",
                    inner.name, inner.timeout, delay
                );
            }
            Outcome::Rejected(rejected) => {
                if rejected.is_shutdown() || inner.scheduler.is_shutdown() {
                    warn!(
                        "Task supervisor '{}' shutting down, rejected the task: {}",
                        inner.name, rejected
                    );
                } else {
                    warn!("Task supervisor '{}' rejected the task: {}", inner.name, rejected);
                }
                inner.stats.record_rejected();
            }
            Outcome::Failed(reason) => {
                if inner.pool.is_shutdown() || inner.scheduler.is_shutdown() {
                    warn!(
                        "Task supervisor '{}' shutting down, task failed: {}",
                        inner.name, reason
                    );
                } else {
                    warn!("Task supervisor '{}' task failed: {}", inner.name, reason);
                }
                inner.stats.record_failure();
            }
        }

        // Cleanup runs on every path: free the worker slot, then go again
        if let Some(job) = submitted {
            job.cancel();
        }
        self.set_in_flight(None);
        self.reschedule();
    }

    fn reschedule(&self) {
        let inner = &self.inner;
        if self.is_cancelled() {
            debug!("Supervisor '{}' cancelled, not rescheduling", inner.name);
            return;
        }
        if inner.scheduler.is_shutdown() {
            debug!("Scheduler shut down, supervisor '{}' stops", inner.name);
            return;
        }

        let delay = inner.backoff.current();
        let next = self.clone();
        match inner
            .scheduler
            .schedule(delay, Box::pin(async move { next.run().await }))
        {
            Ok(()) => debug!("Supervisor '{}' next run in {:?}", inner.name, delay),
            Err(e) => warn!("Supervisor '{}' could not reschedule: {}", inner.name, e),
        }
    }

    fn set_in_flight(&self, job: Option<AbortHandle>) {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *in_flight = job;
    }

    fn take_in_flight(&self) -> Option<AbortHandle> {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.take()
    }
}

impl std::fmt::Debug for TimedSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedSupervisor")
            .field("name", &self.inner.name)
            .field("timeout", &self.inner.timeout)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
