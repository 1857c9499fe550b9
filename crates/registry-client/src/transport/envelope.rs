//! Uniform reply wrapper for registry operations

use std::collections::HashMap;

/// A registry reply: status, headers and an optional decoded body
///
/// Any reply the server actually sent, error statuses included, is an
/// envelope. The entity is only ever present on a 2xx status.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope<T> {
    status: u16,
    headers: HashMap<String, String>,
    entity: Option<T>,
}

impl<T> ResponseEnvelope<T> {
    /// Envelope with no headers and no entity
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            entity: None,
        }
    }

    /// Attach headers, one value per name
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Attach an entity; ignored unless the status is 2xx
    pub fn with_entity(mut self, entity: T) -> Self {
        if self.is_success() {
            self.entity = Some(entity);
        }
        self
    }

    /// HTTP status code
    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// All headers
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// A header value by exact name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The decoded body, if any
    pub fn entity(&self) -> Option<&T> {
        self.entity.as_ref()
    }

    /// Take the decoded body
    pub fn into_entity(self) -> Option<T> {
        self.entity
    }
}
