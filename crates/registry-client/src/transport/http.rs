//! JSON-over-HTTP transport built on `reqwest`
//!
//! Bodies use the registry's root-wrapped JSON form (`{"instance": ..}`,
//! `{"application": ..}`, `{"applications": ..}`). Only 2xx replies are
//! decoded, and HTML error pages are never handed to the decoder.
//!
//! `reqwest` needs a tokio runtime; every call must be awaited inside one.

use super::request::{self, Method, RegistryRequest};
use super::{RegistryTransport, ResponseEnvelope, TransportClientFactory, TransportResult};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result, TransportError};
use crate::models::{Application, Applications, InstanceInfo, InstanceStatus};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings shared by all transports from one factory
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Time allowed between reads once connected
    pub read_timeout: Duration,
    /// How long an idle pooled connection is kept
    pub idle_timeout: Duration,
    /// Idle connections kept per host
    pub max_connections_per_host: usize,
    /// Ask for and accept gzip-encoded bodies
    pub gzip: bool,
    /// Follow redirects
    pub follow_redirects: bool,
    /// `User-Agent` header
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(8),
            idle_timeout: Duration::from_secs(30),
            max_connections_per_host: 50,
            gzip: true,
            follow_redirects: false,
            user_agent: concat!("registry-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Factory sharing one connection pool between its transports
pub struct HttpTransportFactory {
    client: RwLock<Option<reqwest::Client>>,
}

impl HttpTransportFactory {
    /// Create a factory with its own connection pool
    pub fn new(config: &HttpTransportConfig) -> Result<Self> {
        let redirect = if config.follow_redirects {
            Policy::limited(10)
        } else {
            Policy::none()
        };

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .gzip(config.gzip)
            .redirect(redirect)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: RwLock::new(Some(client)),
        })
    }
}

impl TransportClientFactory for HttpTransportFactory {
    fn new_client(&self, endpoint: &Endpoint) -> std::result::Result<Arc<dyn RegistryTransport>, TransportError> {
        let client = self.client.read().unwrap_or_else(|e| e.into_inner());
        match client.as_ref() {
            Some(client) => Ok(Arc::new(HttpTransport::new(endpoint.clone(), client.clone()))),
            None => Err(TransportError::Shutdown),
        }
    }

    fn shutdown(&self) {
        let mut client = self.client.write().unwrap_or_else(|e| e.into_inner());
        if client.take().is_some() {
            info!("HTTP transport factory shut down");
        }
    }
}

impl std::fmt::Debug for HttpTransportFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self.client.read().map(|c| c.is_some()).unwrap_or(false);
        f.debug_struct("HttpTransportFactory").field("open", &open).finish()
    }
}

/// Registry transport bound to one endpoint
pub struct HttpTransport {
    endpoint: Endpoint,
    client: RwLock<Option<reqwest::Client>>,
}

#[derive(Serialize)]
struct InstanceBody<'a> {
    instance: &'a InstanceInfo,
}

#[derive(Deserialize)]
struct InstanceRoot {
    instance: InstanceInfo,
}

#[derive(Deserialize)]
struct ApplicationRoot {
    application: Application,
}

#[derive(Deserialize)]
struct ApplicationsRoot {
    applications: Applications,
}

impl HttpTransport {
    /// Create a transport using `client`'s connection pool
    pub fn new(endpoint: Endpoint, client: reqwest::Client) -> Self {
        Self {
            endpoint,
            client: RwLock::new(Some(client)),
        }
    }

    /// The endpoint this transport talks to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn client(&self) -> std::result::Result<reqwest::Client, TransportError> {
        let client = self.client.read().unwrap_or_else(|e| e.into_inner());
        client.clone().ok_or(TransportError::Shutdown)
    }

    async fn send(
        &self,
        request: &RegistryRequest,
    ) -> std::result::Result<(String, reqwest::Response), TransportError> {
        let client = self.client()?;
        let url = request.url(self.endpoint.service_url());

        let mut builder = client
            .request(wire_method(request.method), &url)
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(info) = &request.body {
            builder = builder.json(&InstanceBody { instance: info });
        }

        match builder.send().await {
            Ok(response) => {
                debug!(
                    "HTTP {} {} -> {}",
                    request.method.as_str(),
                    url,
                    response.status().as_u16()
                );
                Ok((url, response))
            }
            Err(e) => {
                debug!("HTTP {} {} failed: {}", request.method.as_str(), url, e);
                Err(TransportError::connectivity(url, e))
            }
        }
    }

    /// Execute a request whose reply body is ignored
    async fn execute_empty(&self, request: RegistryRequest) -> TransportResult<()> {
        let (_, response) = self.send(&request).await?;
        Ok(ResponseEnvelope::new(response.status().as_u16()).with_headers(headers_of(response.headers())))
    }

    /// Execute a request and decode a 2xx body through its root wrapper
    async fn execute<R, T>(&self, request: RegistryRequest, unwrap: fn(R) -> T) -> TransportResult<T>
    where
        R: DeserializeOwned,
    {
        let (url, response) = self.send(&request).await?;
        let envelope = ResponseEnvelope::new(response.status().as_u16())
            .with_headers(headers_of(response.headers()));

        if !envelope.is_success() || is_html(response.headers()) {
            return Ok(envelope);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::connectivity(url.clone(), e))?;
        if body.is_empty() {
            return Ok(envelope);
        }

        let root: R = serde_json::from_slice(&body).map_err(|e| TransportError::Decode {
            url,
            message: e.to_string(),
        })?;
        Ok(envelope.with_entity(unwrap(root)))
    }
}

#[async_trait]
impl RegistryTransport for HttpTransport {
    async fn register(&self, info: &InstanceInfo) -> TransportResult<()> {
        self.execute_empty(request::register(info)).await
    }

    async fn cancel(&self, app_name: &str, id: &str) -> TransportResult<()> {
        self.execute_empty(request::cancel(app_name, id)).await
    }

    async fn heartbeat(
        &self,
        app_name: &str,
        id: &str,
        info: &InstanceInfo,
        overridden_status: Option<InstanceStatus>,
    ) -> TransportResult<InstanceInfo> {
        let request = request::heartbeat(app_name, id, info, overridden_status);
        self.execute(request, |root: InstanceRoot| root.instance).await
    }

    async fn update_status(
        &self,
        app_name: &str,
        id: &str,
        new_status: InstanceStatus,
        info: &InstanceInfo,
    ) -> TransportResult<()> {
        self.execute_empty(request::update_status(app_name, id, new_status, info))
            .await
    }

    async fn clear_status_override(
        &self,
        app_name: &str,
        id: &str,
        info: &InstanceInfo,
    ) -> TransportResult<()> {
        self.execute_empty(request::clear_status_override(app_name, id, info))
            .await
    }

    async fn fetch_all(&self, regions: &[String]) -> TransportResult<Applications> {
        self.execute(request::fetch_all(regions), |root: ApplicationsRoot| {
            root.applications
        })
        .await
    }

    async fn fetch_delta(&self, regions: &[String]) -> TransportResult<Applications> {
        self.execute(request::fetch_delta(regions), |root: ApplicationsRoot| {
            root.applications
        })
        .await
    }

    async fn fetch_by_vip(&self, vip: &str, regions: &[String]) -> TransportResult<Applications> {
        self.execute(request::fetch_by_vip(vip, regions), |root: ApplicationsRoot| {
            root.applications
        })
        .await
    }

    async fn fetch_by_secure_vip(
        &self,
        vip: &str,
        regions: &[String],
    ) -> TransportResult<Applications> {
        self.execute(
            request::fetch_by_secure_vip(vip, regions),
            |root: ApplicationsRoot| root.applications,
        )
        .await
    }

    async fn fetch_application(&self, app_name: &str) -> TransportResult<Application> {
        self.execute(request::fetch_application(app_name), |root: ApplicationRoot| {
            root.application
        })
        .await
    }

    async fn fetch_instance(&self, app_name: &str, id: &str) -> TransportResult<InstanceInfo> {
        self.execute(request::fetch_instance(app_name, id), |root: InstanceRoot| {
            root.instance
        })
        .await
    }

    async fn fetch_instance_by_id(&self, id: &str) -> TransportResult<InstanceInfo> {
        self.execute(request::fetch_instance_by_id(id), |root: InstanceRoot| {
            root.instance
        })
        .await
    }

    fn shutdown(&self) {
        let mut client = self.client.write().unwrap_or_else(|e| e.into_inner());
        if client.take().is_some() {
            debug!("HTTP transport for {} shut down", self.endpoint);
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.service_url())
            .finish()
    }
}

fn wire_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// First value of every header; values that are not valid text are skipped
fn headers_of(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    map
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("html"))
        .unwrap_or(false)
}
