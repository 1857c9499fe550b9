//! Tokio runtime spawner implementation

use crate::{SpawnedFuture, Spawner};
use tokio::runtime::Handle;

/// Spawner for the Tokio runtime
///
/// Holds a runtime [`Handle`], so futures can be spawned from threads that
/// are not themselves inside the runtime (timer callbacks, smol tasks).
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    /// Create a spawner bound to the given runtime handle
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a spawner bound to the runtime the caller is running in
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Spawner for TokioSpawner {
    fn spawn(&self, future: SpawnedFuture) {
        // JoinHandle detaches when dropped
        drop(self.handle.spawn(future));
    }
}
