//! Runtime-agnostic async utilities
//!
//! This crate provides the execution primitives the registry client is
//! built on, without coupling to a specific async runtime:
//!
//! - [`Spawner`]: spawn a detached future on whatever runtime the host uses
//! - [`runtime_utils::sleep`]: a timer that works under any runtime
//! - [`DelayScheduler`] / [`TimerScheduler`]: "run once after a delay"
//! - [`WorkerPool`]: a bounded pool of concurrently running jobs whose
//!   submissions can be rejected and whose jobs can be cancelled
//!
//! # Examples
//!
//! ```no_run
//! use async_runtime_compat::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[cfg(feature = "smol")]
//! smol::block_on(async {
//!     let spawner: Arc<dyn Spawner> = Arc::new(SmolSpawner);
//!     let pool = WorkerPool::new("heartbeat", 2, spawner.clone());
//!
//!     let task = pool.submit(async { 40 + 2 }).unwrap();
//!     assert_eq!(task.await.unwrap(), 42);
//!
//!     let scheduler = TimerScheduler::new(spawner);
//!     scheduler
//!         .schedule(Duration::from_secs(1), Box::pin(async { println!("later") }))
//!         .unwrap();
//! });
//! ```

#![warn(missing_docs)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub mod pool;
pub mod runtime_utils;
pub mod scheduler;

// Re-export spawner implementations
#[cfg(feature = "tokio")]
pub mod tokio;

#[cfg(feature = "smol")]
pub mod smol;

pub use pool::{PoolTask, Rejected, TaskFailure, WorkerPool};
pub use scheduler::{DelayScheduler, TimerScheduler};

/// A boxed future that can be handed to a [`Spawner`]
pub type SpawnedFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A spawner that can spawn futures on an async runtime
pub trait Spawner: Send + Sync {
    /// Spawn a future on the runtime
    ///
    /// The future will run to completion in the background. Dropping the
    /// runtime may drop the future before it completes.
    fn spawn(&self, future: SpawnedFuture);
}

/// Prelude for common imports
pub mod prelude {
    pub use crate::runtime_utils::sleep;
    pub use crate::{
        DelayScheduler, PoolTask, Rejected, SpawnedFuture, Spawner, TaskFailure, TimerScheduler,
        WorkerPool,
    };

    #[cfg(feature = "tokio")]
    pub use crate::tokio::TokioSpawner;

    #[cfg(feature = "smol")]
    pub use crate::smol::SmolSpawner;
}

/// Create a spawner for the current runtime (if detectable)
///
/// This requires the appropriate feature flag to be enabled. Only tokio can
/// be detected reliably; with the `smol` feature the global smol executor is
/// used as a fallback.
pub fn current_runtime_spawner() -> Option<Arc<dyn Spawner>> {
    #[cfg(feature = "tokio")]
    {
        if let Some(spawner) = crate::tokio::TokioSpawner::try_current() {
            return Some(Arc::new(spawner));
        }
    }

    fallback_spawner()
}

#[cfg(feature = "smol")]
fn fallback_spawner() -> Option<Arc<dyn Spawner>> {
    Some(Arc::new(crate::smol::SmolSpawner))
}

#[cfg(not(feature = "smol"))]
fn fallback_spawner() -> Option<Arc<dyn Spawner>> {
    None
}
