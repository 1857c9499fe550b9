//! Transport capability: the registry operations and who provides them
//!
//! [`RegistryTransport`] is the set of operations a registry client needs,
//! independent of how they reach the wire. A [`TransportClientFactory`]
//! binds one transport to one [`Endpoint`]. Adapters:
//!
//! - [`HttpTransport`] / [`HttpTransportFactory`]: JSON over HTTP with `reqwest`
//! - [`RetryingTransport`]: fails over across the endpoints of a
//!   [`ClusterResolver`](crate::ClusterResolver), wrapping any factory

pub mod envelope;
pub mod http;
pub mod request;
pub mod retry;

pub use envelope::ResponseEnvelope;
pub use http::{HttpTransport, HttpTransportConfig, HttpTransportFactory};
pub use retry::RetryingTransport;

use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::models::{Application, Applications, InstanceInfo, InstanceStatus};
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of one registry operation
///
/// `Ok` for every reply the server sent, whatever its status; `Err` only
/// when no reply was obtained.
pub type TransportResult<T> = std::result::Result<ResponseEnvelope<T>, TransportError>;

/// The operations a registry client performs
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Register an instance
    async fn register(&self, info: &InstanceInfo) -> TransportResult<()>;

    /// Remove an instance's registration
    async fn cancel(&self, app_name: &str, id: &str) -> TransportResult<()>;

    /// Renew an instance's lease
    ///
    /// The registry may answer with its own copy of the instance.
    async fn heartbeat(
        &self,
        app_name: &str,
        id: &str,
        info: &InstanceInfo,
        overridden_status: Option<InstanceStatus>,
    ) -> TransportResult<InstanceInfo>;

    /// Force an instance's status
    async fn update_status(
        &self,
        app_name: &str,
        id: &str,
        new_status: InstanceStatus,
        info: &InstanceInfo,
    ) -> TransportResult<()>;

    /// Remove a forced status
    async fn clear_status_override(
        &self,
        app_name: &str,
        id: &str,
        info: &InstanceInfo,
    ) -> TransportResult<()>;

    /// Fetch every application
    async fn fetch_all(&self, regions: &[String]) -> TransportResult<Applications>;

    /// Fetch changes since the last fetch
    async fn fetch_delta(&self, regions: &[String]) -> TransportResult<Applications>;

    /// Fetch the applications behind a virtual address
    async fn fetch_by_vip(&self, vip: &str, regions: &[String]) -> TransportResult<Applications>;

    /// Fetch the applications behind a secure virtual address
    async fn fetch_by_secure_vip(
        &self,
        vip: &str,
        regions: &[String],
    ) -> TransportResult<Applications>;

    /// Fetch one application
    async fn fetch_application(&self, app_name: &str) -> TransportResult<Application>;

    /// Fetch one instance of an application
    async fn fetch_instance(&self, app_name: &str, id: &str) -> TransportResult<InstanceInfo>;

    /// Fetch an instance by ID alone
    async fn fetch_instance_by_id(&self, id: &str) -> TransportResult<InstanceInfo>;

    /// Release this client's resources; later calls fail with
    /// [`TransportError::Shutdown`]
    fn shutdown(&self);
}

/// Creates transports bound to a single endpoint
pub trait TransportClientFactory: Send + Sync {
    /// A transport talking to `endpoint`
    fn new_client(&self, endpoint: &Endpoint) -> Result<Arc<dyn RegistryTransport>, TransportError>;

    /// Release the shared connection pool; later `new_client` calls fail
    fn shutdown(&self);
}
