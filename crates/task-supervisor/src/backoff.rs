//! Timeout-driven delay arithmetic

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Delay between supervised cycles
///
/// Always within `[base, base × bound]`. Only ever doubles (capped) or
/// resets to `base`. Updated with compare-and-swap.
#[derive(Debug)]
pub(crate) struct Backoff {
    delay_ms: AtomicU64,
    base_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub(crate) fn new(base: Duration, bound: u32) -> Self {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX).max(1);
        let max_ms = base_ms.saturating_mul(u64::from(bound.max(1)));
        Self {
            delay_ms: AtomicU64::new(base_ms),
            base_ms,
            max_ms,
        }
    }

    pub(crate) fn current(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Acquire))
    }

    pub(crate) fn reset(&self) {
        self.delay_ms.store(self.base_ms, Ordering::Release);
    }

    /// Double the delay, capped at the ceiling
    ///
    /// A single CAS attempt: if another writer got there first its value
    /// stands. Returns the delay in effect afterwards.
    pub(crate) fn on_timeout(&self) -> Duration {
        let current = self.delay_ms.load(Ordering::Acquire);
        let next = current.saturating_mul(2).min(self.max_ms);
        let _ = self
            .delay_ms
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire);
        self.current()
    }

    pub(crate) fn ceiling(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}
