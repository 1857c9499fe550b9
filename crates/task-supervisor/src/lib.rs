//! Self-rescheduling task supervision
//!
//! A [`TimedSupervisor`] turns an arbitrary unit of work into a periodic job
//! that cannot silently die:
//!
//! - each cycle submits the work to a bounded [`WorkerPool`] and waits for it
//!   with a hard timeout
//! - a timeout doubles the delay before the next cycle, up to
//!   `timeout × backoff_bound`; the first success resets it
//! - rejections and failures are counted and swallowed
//! - the in-flight job is always cancelled afterwards, and the supervisor
//!   reschedules itself unless its scheduler has been shut down
//!
//! Cycle health is observable only through [`SupervisorStats`], which is
//! published to an injected [`MetricsSink`].
//!
//! # Example
//!
//! ```no_run
//! use async_runtime_compat::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use task_supervisor::{work_fn, MetricsRegistry, TimedSupervisor};
//!
//! # fn example(spawner: Arc<dyn Spawner>) -> anyhow::Result<()> {
//! let scheduler = Arc::new(TimerScheduler::new(spawner.clone()));
//! let pool = Arc::new(WorkerPool::new("heartbeat", 2, spawner));
//! let metrics = Arc::new(MetricsRegistry::new());
//!
//! let supervisor = TimedSupervisor::new(
//!     "heartbeat",
//!     scheduler,
//!     pool,
//!     Duration::from_secs(30),
//!     10,
//!     metrics,
//!     work_fn(|| async {
//!         // send a heartbeat
//!         Ok(())
//!     }),
//! );
//! supervisor.start(Duration::from_secs(30))?;
//!
//! // later
//! supervisor.cancel();
//! # Ok(())
//! # }
//! ```
//!
//! [`WorkerPool`]: async_runtime_compat::WorkerPool

#![warn(missing_docs)]

mod backoff;
pub mod metrics;
pub mod supervisor;

pub use metrics::{MetricsRegistry, MetricsSink, NoopMetrics, StatsSnapshot, SupervisorStats};
pub use supervisor::{work_fn, FnWork, SupervisedWork, TimedSupervisor};
