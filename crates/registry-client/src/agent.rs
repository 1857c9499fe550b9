//! The registry agent: heartbeat and cache refresh on supervised timers
//!
//! A [`RegistryAgent`] owns everything a registry participant runs in the
//! background: one [`TimerScheduler`], one bounded [`WorkerPool`] each for
//! heartbeats and registry fetches, and a [`TimedSupervisor`] for each. All
//! registry traffic goes through a [`RetryingTransport`], so the supervised
//! work never deals with endpoint failover.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::lease::now_millis;
use crate::models::{Applications, InstanceInfo};
use crate::resolver::{ClusterResolver, StaticClusterResolver};
use crate::transport::{
    HttpTransportFactory, RegistryTransport, RetryingTransport, TransportClientFactory,
};
use anyhow::Context;
use async_runtime_compat::{Spawner, TimerScheduler, WorkerPool, current_runtime_spawner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use task_supervisor::{
    MetricsRegistry, MetricsSink, StatsSnapshot, SupervisedWork, TimedSupervisor, work_fn,
};
use tracing::{debug, info, warn};

const HEARTBEAT: &str = "heartbeat";
const CACHE_REFRESH: &str = "cache-refresh";

/// Builder for [`RegistryAgent`]
///
/// Anything not supplied is derived from the configuration: a static
/// resolver over the service URLs, an HTTP transport factory, a spawner for
/// the current runtime and an in-process metrics registry.
pub struct AgentBuilder {
    config: ClientConfig,
    instance: Option<InstanceInfo>,
    resolver: Option<Arc<dyn ClusterResolver>>,
    factory: Option<Arc<dyn TransportClientFactory>>,
    spawner: Option<Arc<dyn Spawner>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl AgentBuilder {
    /// The instance to register and keep alive
    pub fn instance(mut self, instance: InstanceInfo) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Resolve registry endpoints with `resolver`
    pub fn resolver(mut self, resolver: Arc<dyn ClusterResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Create transports with `factory`
    pub fn factory(mut self, factory: Arc<dyn TransportClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Spawn timers and work on `spawner`
    pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Publish supervisor stats to `metrics`
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Assemble the agent; nothing runs until [`RegistryAgent::start`]
    pub fn build(self) -> Result<RegistryAgent> {
        let config = self.config;
        config.validate()?;

        let resolver: Arc<dyn ClusterResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(StaticClusterResolver::new(
                config.region.clone(),
                config.endpoints()?,
            )),
        };
        let factory: Arc<dyn TransportClientFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(HttpTransportFactory::new(&config.http_transport_config())?),
        };
        let spawner: Arc<dyn Spawner> = match self.spawner {
            Some(spawner) => spawner,
            None => current_runtime_spawner().ok_or(Error::NoRuntime)?,
        };
        let metrics: Arc<dyn MetricsSink> = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(MetricsRegistry::new()),
        };

        let transport = Arc::new(
            RetryingTransport::new("registry-transport", resolver, Arc::clone(&factory))
                .with_max_attempts(config.retry_max_attempts),
        );
        let instance = self.instance.map(|i| i.with_lease(config.lease_info()));

        Ok(RegistryAgent {
            inner: Arc::new(AgentInner {
                scheduler: Arc::new(TimerScheduler::new(Arc::clone(&spawner))),
                heartbeat_pool: Arc::new(WorkerPool::new(
                    HEARTBEAT,
                    config.heartbeat_executor_pool_size,
                    Arc::clone(&spawner),
                )),
                refresh_pool: Arc::new(WorkerPool::new(
                    CACHE_REFRESH,
                    config.cache_refresh_executor_pool_size,
                    spawner,
                )),
                config,
                instance: RwLock::new(instance),
                transport,
                factory,
                metrics,
                applications: RwLock::new(None),
                heartbeat: Mutex::new(None),
                refresh: Mutex::new(None),
                registered: AtomicBool::new(false),
                starting: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
        })
    }
}

struct AgentInner {
    config: ClientConfig,
    instance: RwLock<Option<InstanceInfo>>,
    transport: Arc<RetryingTransport>,
    factory: Arc<dyn TransportClientFactory>,
    scheduler: Arc<TimerScheduler>,
    heartbeat_pool: Arc<WorkerPool>,
    refresh_pool: Arc<WorkerPool>,
    metrics: Arc<dyn MetricsSink>,
    applications: RwLock<Option<Applications>>,
    heartbeat: Mutex<Option<TimedSupervisor>>,
    refresh: Mutex<Option<TimedSupervisor>>,
    registered: AtomicBool,
    /// Set while a start is in progress or once one succeeded
    starting: AtomicBool,
    shutdown: AtomicBool,
}

/// A registry participant running heartbeat and cache refresh in the
/// background
///
/// Cloning yields another handle to the same agent.
#[derive(Clone)]
pub struct RegistryAgent {
    inner: Arc<AgentInner>,
}

impl RegistryAgent {
    /// Start building an agent from `config`
    pub fn builder(config: ClientConfig) -> AgentBuilder {
        AgentBuilder {
            config,
            instance: None,
            resolver: None,
            factory: None,
            spawner: None,
            metrics: None,
        }
    }

    /// Fetch the registry, register, and install the supervisors
    ///
    /// A failed initial fetch is logged and left to the refresh cycle. A
    /// refused initial registration fails start-up only when
    /// `enforce_registration_at_init` is set; nothing is left running in that
    /// case and `start` may be called again. Once started, further calls have
    /// no effect.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.shutdown.load(Ordering::Acquire) {
            return Err(Error::Rejected(async_runtime_compat::Rejected::Shutdown));
        }
        if inner
            .starting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Already started, or another start is in progress
            return Ok(());
        }

        match inner.start_once().await {
            Ok(()) => {
                info!("Registry agent started in region {}", inner.config.region);
                Ok(())
            }
            Err(e) => {
                inner.starting.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Register the configured instance
    pub async fn register(&self) -> Result<()> {
        self.inner.register().await
    }

    /// Renew the lease once; re-registers when the registry forgot us
    pub async fn renew(&self) -> anyhow::Result<()> {
        self.inner.renew().await
    }

    /// Fetch the registry once and replace the local view
    pub async fn refresh_registry(&self) -> anyhow::Result<()> {
        self.inner.refresh_registry().await
    }

    /// Stop background work and release every resource
    ///
    /// Unregisters first when `unregister_on_shutdown` is set and the
    /// instance is registered. Calling it again has no effect.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        inner.stop_background();

        if inner.config.unregister_on_shutdown && inner.registered.swap(false, Ordering::AcqRel) {
            if let Some(instance) = inner.current_instance() {
                match inner
                    .transport
                    .cancel(&instance.app_name, &instance.instance_id)
                    .await
                {
                    Ok(envelope) => info!(
                        "Unregistered {}/{} with status {}",
                        instance.app_name,
                        instance.instance_id,
                        envelope.status_code()
                    ),
                    Err(e) => warn!(
                        "Failed to unregister {}/{}: {}",
                        instance.app_name, instance.instance_id, e
                    ),
                }
            }
        }

        inner.transport.shutdown();
        inner.factory.shutdown();
        info!("Registry agent shut down");
    }

    /// The last fetched registry view
    pub fn applications(&self) -> Option<Applications> {
        let applications = self
            .inner
            .applications
            .read()
            .unwrap_or_else(|e| e.into_inner());
        applications.clone()
    }

    /// The instance as last acknowledged or changed locally
    pub fn instance(&self) -> Option<InstanceInfo> {
        self.inner.current_instance()
    }

    /// Whether the registry currently has our registration
    pub fn is_registered(&self) -> bool {
        self.inner.registered.load(Ordering::Acquire)
    }

    /// Heartbeat supervisor counters, once started
    pub fn heartbeat_stats(&self) -> Option<StatsSnapshot> {
        stats_of(&self.inner.heartbeat)
    }

    /// Cache refresh supervisor counters, once started
    pub fn refresh_stats(&self) -> Option<StatsSnapshot> {
        stats_of(&self.inner.refresh)
    }

    /// The configuration the agent was built with
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The failover transport all registry traffic goes through
    pub fn transport(&self) -> Arc<RetryingTransport> {
        Arc::clone(&self.inner.transport)
    }
}

impl std::fmt::Debug for RegistryAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAgent")
            .field("region", &self.inner.config.region)
            .field("registered", &self.is_registered())
            .field("shutdown", &self.inner.shutdown.load(Ordering::Acquire))
            .finish()
    }
}

impl AgentInner {
    /// One start attempt; on error nothing is left installed
    async fn start_once(self: &Arc<Self>) -> Result<()> {
        if self.config.fetch_registry {
            if let Err(e) = self.refresh_registry().await {
                warn!("Initial registry fetch failed: {:#}", e);
            }
        }

        let heartbeat_interval = if self.config.register_with_registry {
            match self.current_instance() {
                Some(instance) => {
                    match self.register().await {
                        Ok(()) => {}
                        Err(e) if self.config.enforce_registration_at_init => return Err(e),
                        Err(e) => warn!("Initial registration failed: {}", e),
                    }
                    Some(instance.lease_info.renewal_interval())
                }
                None => {
                    warn!("Registration enabled but no instance configured, skipping heartbeats");
                    None
                }
            }
        } else {
            None
        };

        let installed = self.install_supervisors(heartbeat_interval);
        if installed.is_err() {
            self.cancel_supervisors();
        }
        installed
    }

    fn install_supervisors(self: &Arc<Self>, heartbeat_interval: Option<Duration>) -> Result<()> {
        if self.config.fetch_registry {
            let interval = self.config.registry_fetch_interval();
            let supervisor = TimedSupervisor::new(
                CACHE_REFRESH,
                self.scheduler.clone(),
                self.refresh_pool.clone(),
                interval,
                self.config.cache_refresh_backoff_bound,
                self.metrics.clone(),
                refresh_work(self),
            );
            *self.refresh.lock().unwrap_or_else(|e| e.into_inner()) = Some(supervisor.clone());
            supervisor.start(interval)?;
        }

        if let Some(interval) = heartbeat_interval {
            let supervisor = TimedSupervisor::new(
                HEARTBEAT,
                self.scheduler.clone(),
                self.heartbeat_pool.clone(),
                interval,
                self.config.heartbeat_backoff_bound,
                self.metrics.clone(),
                heartbeat_work(self),
            );
            *self.heartbeat.lock().unwrap_or_else(|e| e.into_inner()) = Some(supervisor.clone());
            supervisor.start(interval)?;
        }
        Ok(())
    }

    fn cancel_supervisors(&self) {
        for slot in [&self.heartbeat, &self.refresh] {
            let supervisor = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(supervisor) = supervisor {
                supervisor.cancel();
            }
        }
    }

    /// Cancel both cycles and stop the executors behind them
    fn stop_background(&self) {
        self.cancel_supervisors();
        self.scheduler.shutdown();
        self.heartbeat_pool.shutdown();
        self.refresh_pool.shutdown();
    }

    fn current_instance(&self) -> Option<InstanceInfo> {
        self.instance
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn update_instance(&self, update: impl FnOnce(&mut InstanceInfo)) {
        let mut instance = self.instance.write().unwrap_or_else(|e| e.into_inner());
        if let Some(instance) = instance.as_mut() {
            update(instance);
        }
    }

    async fn register(&self) -> Result<()> {
        let instance = self
            .current_instance()
            .ok_or_else(|| Error::Config("no instance configured for registration".to_string()))?;

        let envelope = self.transport.register(&instance).await?;
        let status = envelope.status_code();
        if !envelope.is_success() {
            warn!(
                "Registration of {}/{} refused with status {}",
                instance.app_name, instance.instance_id, status
            );
            return Err(Error::Registration {
                instance: instance.instance_id,
                status,
            });
        }

        self.registered.store(true, Ordering::Release);
        self.update_instance(|i| i.clear_dirty());
        info!(
            "Registered {}/{} with status {}",
            instance.app_name, instance.instance_id, status
        );
        Ok(())
    }

    async fn renew(&self) -> anyhow::Result<()> {
        let instance = self.current_instance().context("no instance to renew")?;
        let envelope = self
            .transport
            .heartbeat(&instance.app_name, &instance.instance_id, &instance, None)
            .await?;

        match envelope.status_code() {
            404 => {
                info!(
                    "Heartbeat for {}/{} returned 404, re-registering",
                    instance.app_name, instance.instance_id
                );
                self.registered.store(false, Ordering::Release);
                self.update_instance(|i| i.mark_dirty());
                self.register().await?;
                Ok(())
            }
            status if (200..300).contains(&status) => {
                let now = now_millis();
                self.update_instance(|i| i.lease_info = i.lease_info.renewed_at(now));
                self.registered.store(true, Ordering::Release);
                debug!("Renewed lease of {}/{}", instance.app_name, instance.instance_id);
                Ok(())
            }
            status => anyhow::bail!(
                "Heartbeat for {}/{} rejected with status {}",
                instance.app_name,
                instance.instance_id,
                status
            ),
        }
    }

    async fn refresh_registry(&self) -> anyhow::Result<()> {
        let regions = &self.config.fetch_remote_regions;
        let envelope = match &self.config.single_vip_address {
            Some(vip) => self.transport.fetch_by_vip(vip, regions).await?,
            None => self.transport.fetch_all(regions).await?,
        };

        let status = envelope.status_code();
        let Some(applications) = envelope.into_entity() else {
            anyhow::bail!("Registry fetch returned status {} without applications", status);
        };

        debug!(
            "Fetched {} applications with {} instances",
            applications.applications.len(),
            applications.instance_count()
        );
        *self.applications.write().unwrap_or_else(|e| e.into_inner()) = Some(applications);
        Ok(())
    }
}

impl Drop for AgentInner {
    fn drop(&mut self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("Registry agent dropped without shutdown, stopping its cycles");
            self.stop_background();
            self.transport.shutdown();
        }
    }
}

fn stats_of(slot: &Mutex<Option<TimedSupervisor>>) -> Option<StatsSnapshot> {
    let supervisor = slot.lock().unwrap_or_else(|e| e.into_inner());
    supervisor.as_ref().map(|s| s.stats().snapshot())
}

/// Work items hold the agent weakly; dropping the last handle cancels the
/// cycles through `Drop for AgentInner`
fn heartbeat_work(inner: &Arc<AgentInner>) -> Arc<dyn SupervisedWork> {
    let agent = Arc::downgrade(inner);
    work_fn(move || {
        let agent = Weak::clone(&agent);
        async move {
            match agent.upgrade() {
                Some(inner) => inner.renew().await,
                None => anyhow::bail!("registry agent dropped"),
            }
        }
    })
}

fn refresh_work(inner: &Arc<AgentInner>) -> Arc<dyn SupervisedWork> {
    let agent = Arc::downgrade(inner);
    work_fn(move || {
        let agent = Weak::clone(&agent);
        async move {
            match agent.upgrade() {
                Some(inner) => inner.refresh_registry().await,
                None => anyhow::bail!("registry agent dropped"),
            }
        }
    })
}
