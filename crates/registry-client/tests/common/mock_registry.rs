//! In-memory registry behind the transport capability

use async_trait::async_trait;
use registry_client::{
    Application, Applications, Endpoint, InstanceInfo, InstanceStatus, RegistryTransport,
    ResponseEnvelope, TransportClientFactory, TransportError, TransportResult,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

/// Shared state every mock transport answers from
pub struct MockRegistry {
    calls: Mutex<Vec<(String, String)>>,
    unreachable: Mutex<HashSet<String>>,
    heartbeat_statuses: Mutex<VecDeque<u16>>,
    registrations: Mutex<Vec<InstanceInfo>>,
    register_status: AtomicU16,
    fetch_status: AtomicU16,
    applications: Mutex<Applications>,
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
            heartbeat_statuses: Mutex::new(VecDeque::new()),
            registrations: Mutex::new(Vec::new()),
            register_status: AtomicU16::new(204),
            fetch_status: AtomicU16::new(200),
            applications: Mutex::new(Applications::default()),
        }
    }
}

impl MockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make connections to `endpoint` fail (or succeed again)
    pub fn set_reachable(&self, endpoint: &Endpoint, reachable: bool) {
        let mut unreachable = self.unreachable.lock().unwrap();
        if reachable {
            unreachable.remove(endpoint.service_url());
        } else {
            unreachable.insert(endpoint.service_url().to_string());
        }
    }

    /// Statuses returned by the next heartbeats, then 200
    pub fn queue_heartbeat_statuses(&self, statuses: &[u16]) {
        self.heartbeat_statuses.lock().unwrap().extend(statuses);
    }

    pub fn set_register_status(&self, status: u16) {
        self.register_status.store(status, Ordering::SeqCst);
    }

    pub fn set_fetch_status(&self, status: u16) {
        self.fetch_status.store(status, Ordering::SeqCst);
    }

    pub fn set_applications(&self, applications: Applications) {
        *self.applications.lock().unwrap() = applications;
    }

    /// `(service url, operation)` for every call that reached the mock
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Operation names in call order
    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|(_, op)| op).collect()
    }

    /// Service URLs in call order
    pub fn endpoints_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|(url, _)| url).collect()
    }

    /// Instances received by `register`
    pub fn registrations(&self) -> Vec<InstanceInfo> {
        self.registrations.lock().unwrap().clone()
    }

    fn record(&self, endpoint: &Endpoint, operation: &str) -> Result<(), TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.service_url().to_string(), operation.to_string()));

        if self.unreachable.lock().unwrap().contains(endpoint.service_url()) {
            let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
            return Err(TransportError::connectivity(endpoint.service_url(), refused));
        }
        Ok(())
    }

    fn fetch(&self) -> ResponseEnvelope<Applications> {
        let status = self.fetch_status.load(Ordering::SeqCst);
        ResponseEnvelope::new(status).with_entity(self.applications.lock().unwrap().clone())
    }
}

/// Transport bound to one endpoint of the mock registry
pub struct MockTransport {
    endpoint: Endpoint,
    registry: Arc<MockRegistry>,
    shut_down: AtomicBool,
}

impl MockTransport {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &str) -> Result<(), TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Shutdown);
        }
        self.registry.record(&self.endpoint, operation)
    }
}

#[async_trait]
impl RegistryTransport for MockTransport {
    async fn register(&self, info: &InstanceInfo) -> TransportResult<()> {
        self.check("register")?;
        self.registry.registrations.lock().unwrap().push(info.clone());
        Ok(ResponseEnvelope::new(
            self.registry.register_status.load(Ordering::SeqCst),
        ))
    }

    async fn cancel(&self, _app_name: &str, _id: &str) -> TransportResult<()> {
        self.check("cancel")?;
        Ok(ResponseEnvelope::new(200))
    }

    async fn heartbeat(
        &self,
        _app_name: &str,
        _id: &str,
        info: &InstanceInfo,
        _overridden_status: Option<InstanceStatus>,
    ) -> TransportResult<InstanceInfo> {
        self.check("heartbeat")?;
        let status = self
            .registry
            .heartbeat_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(200);
        Ok(ResponseEnvelope::new(status).with_entity(info.clone()))
    }

    async fn update_status(
        &self,
        _app_name: &str,
        _id: &str,
        _new_status: InstanceStatus,
        _info: &InstanceInfo,
    ) -> TransportResult<()> {
        self.check("update_status")?;
        Ok(ResponseEnvelope::new(200))
    }

    async fn clear_status_override(
        &self,
        _app_name: &str,
        _id: &str,
        _info: &InstanceInfo,
    ) -> TransportResult<()> {
        self.check("clear_status_override")?;
        Ok(ResponseEnvelope::new(200))
    }

    async fn fetch_all(&self, _regions: &[String]) -> TransportResult<Applications> {
        self.check("fetch_all")?;
        Ok(self.registry.fetch())
    }

    async fn fetch_delta(&self, _regions: &[String]) -> TransportResult<Applications> {
        self.check("fetch_delta")?;
        Ok(self.registry.fetch())
    }

    async fn fetch_by_vip(&self, _vip: &str, _regions: &[String]) -> TransportResult<Applications> {
        self.check("fetch_by_vip")?;
        Ok(self.registry.fetch())
    }

    async fn fetch_by_secure_vip(
        &self,
        _vip: &str,
        _regions: &[String],
    ) -> TransportResult<Applications> {
        self.check("fetch_by_secure_vip")?;
        Ok(self.registry.fetch())
    }

    async fn fetch_application(&self, app_name: &str) -> TransportResult<Application> {
        self.check("fetch_application")?;
        let applications = self.registry.applications.lock().unwrap();
        Ok(match applications.get(app_name) {
            Some(app) => ResponseEnvelope::new(200).with_entity(app.clone()),
            None => ResponseEnvelope::new(404),
        })
    }

    async fn fetch_instance(&self, app_name: &str, id: &str) -> TransportResult<InstanceInfo> {
        self.check("fetch_instance")?;
        let applications = self.registry.applications.lock().unwrap();
        Ok(
            match applications.get(app_name).and_then(|a| a.instance(id)) {
                Some(instance) => ResponseEnvelope::new(200).with_entity(instance.clone()),
                None => ResponseEnvelope::new(404),
            },
        )
    }

    async fn fetch_instance_by_id(&self, id: &str) -> TransportResult<InstanceInfo> {
        self.check("fetch_instance_by_id")?;
        let applications = self.registry.applications.lock().unwrap();
        let found = applications
            .applications
            .iter()
            .find_map(|a| a.instance(id).cloned());
        Ok(match found {
            Some(instance) => ResponseEnvelope::new(200).with_entity(instance),
            None => ResponseEnvelope::new(404),
        })
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out [`MockTransport`]s and remembering them
pub struct MockFactory {
    registry: Arc<MockRegistry>,
    created: Mutex<Vec<Arc<MockTransport>>>,
    shut_down: AtomicBool,
}

impl MockFactory {
    pub fn new(registry: Arc<MockRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            created: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Every transport created so far, oldest first
    pub fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().unwrap().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl TransportClientFactory for MockFactory {
    fn new_client(&self, endpoint: &Endpoint) -> Result<Arc<dyn RegistryTransport>, TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Shutdown);
        }
        let transport = Arc::new(MockTransport {
            endpoint: endpoint.clone(),
            registry: Arc::clone(&self.registry),
            shut_down: AtomicBool::new(false),
        });
        self.created.lock().unwrap().push(Arc::clone(&transport));
        Ok(transport)
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}
