//! Client side of a service registry
//!
//! This crate keeps a process registered with a remote service registry and
//! keeps a local copy of the registry fresh, surviving the failure of
//! individual registry servers along the way.
//!
//! # Architecture
//!
//! Leaf first:
//!
//! - [`LeaseInfo`]: immutable lease timing snapshots
//! - [`Endpoint`] and [`ClusterResolver`]: which registry servers exist
//! - [`RegistryTransport`] and [`TransportClientFactory`]: the registry
//!   operations, answered with a [`ResponseEnvelope`] whatever the status
//! - [`RegistryAgent`]: heartbeat and cache refresh, each driven by a
//!   [`TimedSupervisor`](task_supervisor::TimedSupervisor)
//!
//! Failover lives in [`RetryingTransport`]; the supervisors only see work
//! that succeeded, failed, or took too long.
//!
//! # Example
//!
//! ```no_run
//! use registry_client::{ClientConfig, InstanceInfo, RegistryAgent};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::from_file("registry-client.yaml").await?;
//! let instance = InstanceInfo::new("orders", "orders-1", "10.0.0.7", 8080);
//!
//! let agent = RegistryAgent::builder(config).instance(instance).build()?;
//! agent.start().await?;
//!
//! if let Some(apps) = agent.applications() {
//!     println!("{} instances known", apps.instance_count());
//! }
//!
//! agent.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod agent;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod lease;
pub mod models;
pub mod resolver;
pub mod transport;

pub use agent::{AgentBuilder, RegistryAgent};
pub use config::ClientConfig;
pub use endpoint::Endpoint;
pub use error::{Error, Result, TransportError};
pub use lease::{LeaseInfo, LeaseInfoBuilder};
pub use models::*;
pub use resolver::{
    ClusterResolver, ReloadingClusterResolver, StaticClusterResolver, membership, same_membership,
};
pub use transport::{
    HttpTransport, HttpTransportConfig, HttpTransportFactory, RegistryTransport, ResponseEnvelope,
    RetryingTransport, TransportClientFactory, TransportResult,
};
