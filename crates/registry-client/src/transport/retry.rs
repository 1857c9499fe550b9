//! Failover across the endpoints of a cluster

use super::{RegistryTransport, TransportClientFactory, TransportResult};
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::models::{Application, Applications, InstanceInfo, InstanceStatus};
use crate::resolver::ClusterResolver;
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Attempts per operation unless configured otherwise
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

#[derive(Default)]
struct RetryState {
    current: Option<(Endpoint, Arc<dyn RegistryTransport>)>,
    quarantine: HashSet<Endpoint>,
}

/// [`RegistryTransport`] that retries across a cluster's endpoints
///
/// Sticks to the last endpoint that answered. When an endpoint cannot be
/// reached it is quarantined, its client is shut down and the next candidate
/// is tried, up to `max_attempts` per operation. Once every endpoint is
/// quarantined the quarantine is lifted. Server replies, whatever their
/// status, are returned as they are and never retried.
pub struct RetryingTransport {
    name: String,
    resolver: Arc<dyn ClusterResolver>,
    factory: Arc<dyn TransportClientFactory>,
    max_attempts: usize,
    state: Mutex<RetryState>,
    shutdown: AtomicBool,
}

impl RetryingTransport {
    /// Create a retrying transport drawing endpoints from `resolver`
    pub fn new(
        name: impl Into<String>,
        resolver: Arc<dyn ClusterResolver>,
        factory: Arc<dyn TransportClientFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            resolver,
            factory,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            state: Mutex::new(RetryState::default()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Set the number of attempts per operation (at least one)
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Endpoint the next operation will go to first, if one is bound
    pub fn current_endpoint(&self) -> Option<Endpoint> {
        let state = self.lock_state();
        state.current.as_ref().map(|(endpoint, _)| endpoint.clone())
    }

    /// Number of endpoints currently quarantined
    pub fn quarantined(&self) -> usize {
        self.lock_state().quarantine.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RetryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `op` against successive endpoints until one replies
    async fn execute<T, F, Fut>(&self, operation: &str, op: F) -> TransportResult<T>
    where
        F: Fn(Arc<dyn RegistryTransport>) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }

        let mut last = None;
        for attempt in 1..=self.max_attempts {
            let (endpoint, client) = self.candidate()?;
            match op(Arc::clone(&client)).await {
                Ok(envelope) => return Ok(envelope),
                Err(e) if e.is_connectivity() => {
                    warn!(
                        "{} {} via {} failed (attempt {}/{}): {}",
                        self.name, operation, endpoint, attempt, self.max_attempts, e
                    );
                    self.quarantine(&endpoint, &client);
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(TransportError::RetriesExhausted {
            attempts: self.max_attempts,
            last: Box::new(last.unwrap_or(TransportError::NoEndpoints)),
        })
    }

    /// The bound client, or a fresh one for the first healthy endpoint
    fn candidate(&self) -> Result<(Endpoint, Arc<dyn RegistryTransport>), TransportError> {
        if let Some((endpoint, client)) = &self.lock_state().current {
            return Ok((endpoint.clone(), Arc::clone(client)));
        }

        // Resolve without holding the state lock; the resolver may reload
        let endpoints = self.resolver.cluster_endpoints();
        if endpoints.is_empty() {
            return Err(TransportError::NoEndpoints);
        }

        let mut state = self.lock_state();
        if let Some((endpoint, client)) = &state.current {
            return Ok((endpoint.clone(), Arc::clone(client)));
        }

        // Forget endpoints that left the cluster
        state.quarantine.retain(|e| endpoints.contains(e));

        let mut candidates = endpoints.iter().filter(|e| !state.quarantine.contains(*e));
        let endpoint = match candidates.next() {
            Some(endpoint) => endpoint.clone(),
            None => {
                info!(
                    "{}: all {} endpoints quarantined, clearing quarantine",
                    self.name,
                    endpoints.len()
                );
                state.quarantine.clear();
                endpoints[0].clone()
            }
        };

        let client = self.factory.new_client(&endpoint)?;
        debug!("{} bound to {}", self.name, endpoint);
        state.current = Some((endpoint.clone(), Arc::clone(&client)));
        Ok((endpoint, client))
    }

    fn quarantine(&self, endpoint: &Endpoint, client: &Arc<dyn RegistryTransport>) {
        client.shutdown();
        let mut state = self.lock_state();
        if state.current.as_ref().is_some_and(|(bound, _)| bound == endpoint) {
            state.current = None;
        }
        state.quarantine.insert(endpoint.clone());
    }
}

#[async_trait]
impl RegistryTransport for RetryingTransport {
    async fn register(&self, info: &InstanceInfo) -> TransportResult<()> {
        self.execute("register", |client| async move { client.register(info).await })
            .await
    }

    async fn cancel(&self, app_name: &str, id: &str) -> TransportResult<()> {
        self.execute("cancel", |client| async move { client.cancel(app_name, id).await })
            .await
    }

    async fn heartbeat(
        &self,
        app_name: &str,
        id: &str,
        info: &InstanceInfo,
        overridden_status: Option<InstanceStatus>,
    ) -> TransportResult<InstanceInfo> {
        self.execute("heartbeat", |client| async move {
            client.heartbeat(app_name, id, info, overridden_status).await
        })
        .await
    }

    async fn update_status(
        &self,
        app_name: &str,
        id: &str,
        new_status: InstanceStatus,
        info: &InstanceInfo,
    ) -> TransportResult<()> {
        self.execute("update_status", |client| async move {
            client.update_status(app_name, id, new_status, info).await
        })
        .await
    }

    async fn clear_status_override(
        &self,
        app_name: &str,
        id: &str,
        info: &InstanceInfo,
    ) -> TransportResult<()> {
        self.execute("clear_status_override", |client| async move {
            client.clear_status_override(app_name, id, info).await
        })
        .await
    }

    async fn fetch_all(&self, regions: &[String]) -> TransportResult<Applications> {
        self.execute("fetch_all", |client| async move { client.fetch_all(regions).await })
            .await
    }

    async fn fetch_delta(&self, regions: &[String]) -> TransportResult<Applications> {
        self.execute("fetch_delta", |client| async move { client.fetch_delta(regions).await })
            .await
    }

    async fn fetch_by_vip(&self, vip: &str, regions: &[String]) -> TransportResult<Applications> {
        self.execute("fetch_by_vip", |client| async move {
            client.fetch_by_vip(vip, regions).await
        })
        .await
    }

    async fn fetch_by_secure_vip(
        &self,
        vip: &str,
        regions: &[String],
    ) -> TransportResult<Applications> {
        self.execute("fetch_by_secure_vip", |client| async move {
            client.fetch_by_secure_vip(vip, regions).await
        })
        .await
    }

    async fn fetch_application(&self, app_name: &str) -> TransportResult<Application> {
        self.execute("fetch_application", |client| async move {
            client.fetch_application(app_name).await
        })
        .await
    }

    async fn fetch_instance(&self, app_name: &str, id: &str) -> TransportResult<InstanceInfo> {
        self.execute("fetch_instance", |client| async move {
            client.fetch_instance(app_name, id).await
        })
        .await
    }

    async fn fetch_instance_by_id(&self, id: &str) -> TransportResult<InstanceInfo> {
        self.execute("fetch_instance_by_id", |client| async move {
            client.fetch_instance_by_id(id).await
        })
        .await
    }

    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let current = self.lock_state().current.take();
        if let Some((_, client)) = current {
            client.shutdown();
        }
        info!("{} shut down", self.name);
    }
}

impl std::fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("current", &self.current_endpoint())
            .finish()
    }
}
