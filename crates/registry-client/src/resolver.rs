//! Cluster resolution: which registry endpoints to talk to

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Source of the current registry endpoint list
///
/// Called from every request path, so implementations must be cheap and
/// safe under concurrent use.
pub trait ClusterResolver: Send + Sync {
    /// Region the endpoints belong to
    fn region(&self) -> &str;

    /// Endpoints in preference order
    fn cluster_endpoints(&self) -> Vec<Endpoint>;
}

/// The set of endpoints in a resolution, ignoring order
pub fn membership(endpoints: &[Endpoint]) -> BTreeSet<Endpoint> {
    endpoints.iter().cloned().collect()
}

/// Whether two resolutions name the same endpoints
pub fn same_membership(a: &[Endpoint], b: &[Endpoint]) -> bool {
    membership(a) == membership(b)
}

/// Resolver over a fixed endpoint list
#[derive(Debug, Clone)]
pub struct StaticClusterResolver {
    region: String,
    endpoints: Vec<Endpoint>,
}

impl StaticClusterResolver {
    /// Create a resolver over `endpoints`
    pub fn new(region: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            region: region.into(),
            endpoints,
        }
    }

    /// Create a resolver from service URLs
    pub fn from_urls<S: AsRef<str>>(region: impl Into<String>, urls: &[S]) -> Result<Self> {
        let endpoints = urls
            .iter()
            .map(|url| Endpoint::from_url(url.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(region, endpoints))
    }
}

impl ClusterResolver for StaticClusterResolver {
    fn region(&self) -> &str {
        &self.region
    }

    fn cluster_endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.clone()
    }
}

type Loader = Box<dyn Fn() -> Result<Vec<Endpoint>> + Send + Sync>;

struct Cached {
    endpoints: Vec<Endpoint>,
    loaded_at: Instant,
}

/// Resolver that periodically reloads its endpoint list
///
/// The loader runs on the calling thread at most once per reload interval,
/// outside any lock: while one caller reloads, everyone else keeps reading
/// the cached list. The cached list is swapped only when the membership
/// actually changed; a failing loader or an empty result keeps the last good
/// list.
pub struct ReloadingClusterResolver {
    region: String,
    reload_interval: Duration,
    loader: Loader,
    cached: RwLock<Cached>,
    reloading: AtomicBool,
}

/// Clears the reloading flag however the reload ends
struct ReloadGuard<'a>(&'a AtomicBool);

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReloadingClusterResolver {
    /// Create a resolver, performing the initial load immediately
    pub fn new<F>(region: impl Into<String>, reload_interval: Duration, loader: F) -> Result<Self>
    where
        F: Fn() -> Result<Vec<Endpoint>> + Send + Sync + 'static,
    {
        let endpoints = loader()?;
        if endpoints.is_empty() {
            return Err(Error::Config(
                "initial endpoint resolution returned no endpoints".to_string(),
            ));
        }

        Ok(Self {
            region: region.into(),
            reload_interval,
            loader: Box::new(loader),
            cached: RwLock::new(Cached {
                endpoints,
                loaded_at: Instant::now(),
            }),
            reloading: AtomicBool::new(false),
        })
    }

    fn reload_due(&self) -> bool {
        let cached = self.cached.read().unwrap_or_else(|e| e.into_inner());
        cached.loaded_at.elapsed() >= self.reload_interval
    }

    fn reload(&self) {
        if self
            .reloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let _guard = ReloadGuard(&self.reloading);
        // Another caller may have finished a reload since we checked
        if !self.reload_due() {
            return;
        }

        let loaded = (self.loader)();

        let mut cached = self.cached.write().unwrap_or_else(|e| e.into_inner());
        cached.loaded_at = Instant::now();
        match loaded {
            Ok(endpoints) if endpoints.is_empty() => {
                warn!(
                    "Endpoint reload for region {} returned nothing, keeping {} endpoints",
                    self.region,
                    cached.endpoints.len()
                );
            }
            Ok(endpoints) => {
                if !same_membership(&cached.endpoints, &endpoints) {
                    info!(
                        "Registry endpoints for region {} changed: {} -> {}",
                        self.region,
                        cached.endpoints.len(),
                        endpoints.len()
                    );
                    cached.endpoints = endpoints;
                }
            }
            Err(e) => {
                warn!(
                    "Endpoint reload for region {} failed, keeping last list: {}",
                    self.region, e
                );
            }
        }
    }
}

impl ClusterResolver for ReloadingClusterResolver {
    fn region(&self) -> &str {
        &self.region
    }

    fn cluster_endpoints(&self) -> Vec<Endpoint> {
        if self.reload_due() {
            self.reload();
        }
        let cached = self.cached.read().unwrap_or_else(|e| e.into_inner());
        cached.endpoints.clone()
    }
}

impl std::fmt::Debug for ReloadingClusterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadingClusterResolver")
            .field("region", &self.region)
            .field("reload_interval", &self.reload_interval)
            .finish()
    }
}
