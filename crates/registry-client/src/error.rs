//! Error types for the registry client

use thiserror::Error;

/// Failure to obtain any reply from a registry endpoint
///
/// A reply with an error status is not a `TransportError`; it comes back as
/// a normal [`ResponseEnvelope`](crate::ResponseEnvelope).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The endpoint could not be reached or the exchange broke off
    #[error("Cannot reach {url}: {source}")]
    Connectivity {
        /// Request URL
        url: String,
        /// Underlying I/O or client error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A successful reply carried a body that could not be decoded
    #[error("Failed to decode response from {url}: {message}")]
    Decode {
        /// Request URL
        url: String,
        /// Decoder message
        message: String,
    },

    /// The transport or its factory has been shut down
    #[error("Transport is shut down")]
    Shutdown,

    /// The resolver returned no endpoints
    #[error("No registry endpoints available")]
    NoEndpoints,

    /// Every attempt across endpoints failed to connect
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: usize,
        /// The last connectivity failure
        #[source]
        last: Box<TransportError>,
    },

    /// A service URL could not be turned into an endpoint
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// Offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },
}

impl TransportError {
    /// Build a connectivity failure for `url`
    pub fn connectivity(
        url: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        TransportError::Connectivity {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Whether retrying against another endpoint may help
    pub fn is_connectivity(&self) -> bool {
        matches!(self, TransportError::Connectivity { .. })
    }
}

/// Registry client error type
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The registry refused a registration
    #[error("Registration of {instance} failed with status {status}")]
    Registration {
        /// Instance ID
        instance: String,
        /// Status returned by the registry
        status: u16,
    },

    /// A scheduler or worker pool refused work
    #[error("Scheduling rejected: {0}")]
    Rejected(#[from] async_runtime_compat::Rejected),

    /// No async runtime could be detected for spawning background work
    #[error("No async runtime available for spawning background tasks")]
    NoRuntime,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
