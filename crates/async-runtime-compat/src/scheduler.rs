//! Delayed one-shot scheduling

use crate::runtime_utils::sleep;
use crate::{Rejected, SpawnedFuture, Spawner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A facility that runs a future once after a delay
pub trait DelayScheduler: Send + Sync {
    /// Run `task` once, after `delay` has elapsed
    ///
    /// Fails with [`Rejected::Shutdown`] once the scheduler is shut down.
    fn schedule(&self, delay: Duration, task: SpawnedFuture) -> Result<(), Rejected>;

    /// Whether the scheduler has stopped accepting work
    fn is_shutdown(&self) -> bool;
}

/// Timer-backed [`DelayScheduler`]
///
/// Each scheduled task sleeps on its own spawned future, so any number of
/// independent schedules may be pending at once. Tasks whose delay elapses
/// after [`TimerScheduler::shutdown`] are dropped without running.
pub struct TimerScheduler {
    spawner: Arc<dyn Spawner>,
    shutdown: Arc<AtomicBool>,
}

impl TimerScheduler {
    /// Create a scheduler that spawns its timers on `spawner`
    pub fn new(spawner: Arc<dyn Spawner>) -> Self {
        Self {
            spawner,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop accepting and running scheduled tasks
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            info!("Scheduler shut down");
        }
    }
}

impl DelayScheduler for TimerScheduler {
    fn schedule(&self, delay: Duration, task: SpawnedFuture) -> Result<(), Rejected> {
        if self.is_shutdown() {
            return Err(Rejected::Shutdown);
        }

        let shutdown = Arc::clone(&self.shutdown);
        self.spawner.spawn(Box::pin(async move {
            sleep(delay).await;
            if shutdown.load(Ordering::Acquire) {
                debug!("Dropping scheduled task, scheduler is shut down");
                return;
            }
            task.await;
        }));
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
