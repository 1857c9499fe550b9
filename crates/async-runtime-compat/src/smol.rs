//! Smol runtime spawner implementation

use crate::{SpawnedFuture, Spawner};

/// Spawner for the Smol runtime
///
/// Futures run on smol's global executor.
#[derive(Debug, Clone, Copy)]
pub struct SmolSpawner;

impl Spawner for SmolSpawner {
    fn spawn(&self, future: SpawnedFuture) {
        smol::spawn(future).detach();
    }
}
