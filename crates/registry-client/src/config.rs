//! Client configuration

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::lease::LeaseInfo;
use crate::transport::HttpTransportConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Registry client configuration
///
/// Every field has a default, so a file only needs to list what differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Region this client lives in
    pub region: String,

    /// Registry service URLs, in preference order
    pub service_urls: Vec<String>,

    /// Seconds between registry fetches
    pub registry_fetch_interval_secs: u64,

    /// Worker slots for heartbeats
    pub heartbeat_executor_pool_size: usize,

    /// Heartbeat delay never exceeds renewal interval × this bound
    pub heartbeat_backoff_bound: u32,

    /// Worker slots for registry fetches
    pub cache_refresh_executor_pool_size: usize,

    /// Fetch delay never exceeds fetch interval × this bound
    pub cache_refresh_backoff_bound: u32,

    /// Seconds allowed to connect to a registry server
    pub connect_timeout_secs: u64,

    /// Seconds allowed between reads from a registry server
    pub read_timeout_secs: u64,

    /// Seconds an idle connection stays pooled
    pub connection_idle_timeout_secs: u64,

    /// Pooled connections kept per registry server
    pub max_connections_per_host: usize,

    /// Accept gzip-encoded replies
    pub gzip_content: bool,

    /// Follow HTTP redirects from registry servers
    pub allow_redirects: bool,

    /// Attempts per operation across registry servers
    pub retry_max_attempts: usize,

    /// Register this instance and keep its lease alive
    pub register_with_registry: bool,

    /// Keep a local copy of the registry
    pub fetch_registry: bool,

    /// Unregister on shutdown
    pub unregister_on_shutdown: bool,

    /// Fail start-up when the initial registration is refused
    pub enforce_registration_at_init: bool,

    /// Additional regions to include in fetches
    pub fetch_remote_regions: Vec<String>,

    /// Only fetch instances behind this virtual address
    pub single_vip_address: Option<String>,

    /// Seconds between lease renewals
    pub lease_renewal_interval_secs: i64,

    /// Seconds a lease survives without renewal
    pub lease_duration_secs: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            service_urls: vec!["http://localhost:8761/eureka/".to_string()],
            registry_fetch_interval_secs: 30,
            heartbeat_executor_pool_size: 2,
            heartbeat_backoff_bound: 10,
            cache_refresh_executor_pool_size: 2,
            cache_refresh_backoff_bound: 10,
            connect_timeout_secs: 5,
            read_timeout_secs: 8,
            connection_idle_timeout_secs: 30,
            max_connections_per_host: 50,
            gzip_content: true,
            allow_redirects: false,
            retry_max_attempts: 3,
            register_with_registry: true,
            fetch_registry: true,
            unregister_on_shutdown: true,
            enforce_registration_at_init: false,
            fetch_remote_regions: Vec::new(),
            single_vip_address: None,
            lease_renewal_interval_secs: 30,
            lease_duration_secs: 90,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML (`.yaml`/`.yml`) or JSON file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use async_fs::File;
        use futures::io::AsyncReadExt;

        let path = path.as_ref();
        let mut file = File::open(path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
            Some("json") => Ok(serde_json::from_str(&contents)?),
            other => Err(Error::Config(format!(
                "Unsupported config format {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Check the configuration for values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.service_urls.is_empty() {
            return Err(Error::Config("service_urls must not be empty".to_string()));
        }
        self.endpoints()?;

        if self.registry_fetch_interval_secs == 0 {
            return Err(Error::Config(
                "registry_fetch_interval_secs must be positive".to_string(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(Error::Config("region must not be empty".to_string()));
        }
        Ok(())
    }

    /// Registry endpoints parsed from the service URLs
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.service_urls
            .iter()
            .map(|url| Endpoint::from_url(url).map_err(Error::from))
            .collect()
    }

    /// Interval between registry fetches
    pub fn registry_fetch_interval(&self) -> Duration {
        Duration::from_secs(self.registry_fetch_interval_secs)
    }

    /// Lease timings for this instance, with non-positive values defaulted
    pub fn lease_info(&self) -> LeaseInfo {
        LeaseInfo::builder()
            .renewal_interval_secs(self.lease_renewal_interval_secs)
            .duration_secs(self.lease_duration_secs)
            .build()
    }

    /// Connection settings for the HTTP transport
    pub fn http_transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            idle_timeout: Duration::from_secs(self.connection_idle_timeout_secs),
            max_connections_per_host: self.max_connections_per_host,
            gzip: self.gzip_content,
            follow_redirects: self.allow_redirects,
            ..HttpTransportConfig::default()
        }
    }
}
