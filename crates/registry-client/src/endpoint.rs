//! Registry endpoint addresses

use crate::error::TransportError;
use reqwest::Url;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Address of one registry server
///
/// Two endpoints are equal, ordered and hashed purely by their service URL.
#[derive(Debug, Clone)]
pub struct Endpoint {
    secure: bool,
    network_address: String,
    port: u16,
    relative_uri: String,
    service_url: String,
}

impl Endpoint {
    /// Create an endpoint
    ///
    /// A relative URI without a leading `/` gets one; an empty one becomes
    /// `/`.
    pub fn new(
        network_address: impl Into<String>,
        port: u16,
        secure: bool,
        relative_uri: impl AsRef<str>,
    ) -> Self {
        let network_address = network_address.into();
        let relative_uri = normalize_relative_uri(relative_uri.as_ref());
        let scheme = if secure { "https" } else { "http" };
        let service_url = format!("{}://{}:{}{}", scheme, network_address, port, relative_uri);

        Self {
            secure,
            network_address,
            port,
            relative_uri,
            service_url,
        }
    }

    /// Parse a service URL such as `http://registry:8761/eureka/v2/`
    pub fn from_url(url: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        let secure = match parsed.scheme() {
            "http" => false,
            "https" => true,
            _ => return Err(invalid("scheme must be http or https")),
        };
        let host = parsed.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        Ok(Self::new(host, port, secure, parsed.path()))
    }

    /// Full base URL of the registry API
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Host name or IP address
    pub fn network_address(&self) -> &str {
        &self.network_address
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the endpoint speaks TLS
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Path under which the registry API is mounted, always starting with `/`
    pub fn relative_uri(&self) -> &str {
        &self.relative_uri
    }
}

fn normalize_relative_uri(uri: &str) -> String {
    if uri.starts_with('/') {
        uri.to_string()
    } else {
        format!("/{}", uri)
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.service_url == other.service_url
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service_url.hash(state);
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.service_url.cmp(&other.service_url)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service_url)
    }
}
