//! Supervisor counters and the sink they are published to

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Live counters for one supervisor
///
/// Four monotonically increasing counters plus a gauge of worker-pool
/// utilisation. The gauge is sampled right after submission and again after
/// a successful completion. Timed-out and failed cycles keep the value
/// sampled at submission, and a rejected submission samples nothing.
#[derive(Debug, Default)]
pub struct SupervisorStats {
    success: AtomicU64,
    timeouts: AtomicU64,
    rejected: AtomicU64,
    failures: AtomicU64,
    pool_used: AtomicU64,
}

impl SupervisorStats {
    /// Cycles whose work finished within the timeout
    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    /// Cycles whose work exceeded the timeout
    pub fn timeout_count(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Cycles whose submission was rejected by the pool
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Cycles whose work failed for any other reason
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Worker slots in use at the last sample
    pub fn pool_used(&self) -> u64 {
        self.pool_used.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            success: self.success_count(),
            timeouts: self.timeout_count(),
            rejected: self.rejected_count(),
            failures: self.failure_count(),
            pool_used: self.pool_used(),
        }
    }

    pub(crate) fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_pool_used(&self, used: usize) {
        self.pool_used.store(used as u64, Ordering::Relaxed);
    }
}

/// Serializable copy of [`SupervisorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Successful cycles
    pub success: u64,
    /// Timed-out cycles
    pub timeouts: u64,
    /// Rejected submissions
    pub rejected: u64,
    /// Other failures
    pub failures: u64,
    /// Worker slots in use at the last sample
    pub pool_used: u64,
}

/// Destination for supervisor statistics
///
/// Supervisors register themselves by name when constructed and unregister
/// when cancelled.
pub trait MetricsSink: Send + Sync {
    /// Start publishing `stats` under `name`
    fn register(&self, name: &str, stats: Arc<SupervisorStats>);

    /// Stop publishing the stats registered under `name`
    fn unregister(&self, name: &str);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn register(&self, _name: &str, _stats: Arc<SupervisorStats>) {}

    fn unregister(&self, _name: &str) {}
}

/// In-process sink keeping every registered supervisor's stats
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    monitors: RwLock<HashMap<String, Arc<SupervisorStats>>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats registered under `name`
    pub fn get(&self, name: &str) -> Option<Arc<SupervisorStats>> {
        let monitors = self.monitors.read().unwrap_or_else(|e| e.into_inner());
        monitors.get(name).cloned()
    }

    /// Names of all registered supervisors, sorted
    pub fn names(&self) -> Vec<String> {
        let monitors = self.monitors.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = monitors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every registered supervisor
    pub fn snapshot(&self) -> BTreeMap<String, StatsSnapshot> {
        let monitors = self.monitors.read().unwrap_or_else(|e| e.into_inner());
        monitors
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect()
    }
}

impl MetricsSink for MetricsRegistry {
    fn register(&self, name: &str, stats: Arc<SupervisorStats>) {
        let mut monitors = self.monitors.write().unwrap_or_else(|e| e.into_inner());
        if monitors.insert(name.to_string(), stats).is_some() {
            debug!("Replaced metrics registered under '{}'", name);
        }
    }

    fn unregister(&self, name: &str) {
        let mut monitors = self.monitors.write().unwrap_or_else(|e| e.into_inner());
        monitors.remove(name);
    }
}
