//! Timer helpers
//!
//! The scheduler and the supervisor's per-cycle deadline both wait through
//! [`sleep`], so they work the same under tokio and smol.

use std::time::Duration;

/// Sleep for the specified duration
///
/// Inside a tokio runtime (with the `tokio` feature) tokio's timer is used;
/// everywhere else the runtime-independent `async-io` timer is used, which
/// is also what smol uses.
pub async fn sleep(duration: Duration) {
    #[cfg(feature = "tokio")]
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::time::sleep(duration).await;
            return;
        }
    }

    async_io::Timer::after(duration).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep() {
        smol::block_on(async {
            let start = std::time::Instant::now();
            sleep(Duration::from_millis(100)).await;
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(100));
            assert!(elapsed < Duration::from_millis(500));
        });
    }
}
