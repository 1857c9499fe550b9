//! Data models exchanged with the registry

use crate::lease::{LeaseInfo, now_millis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Availability of an instance as reported to the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Ready to receive traffic
    Up,
    /// Not ready to receive traffic
    Down,
    /// Still initializing
    Starting,
    /// Deliberately taken out of rotation
    OutOfService,
    /// Status not known
    #[default]
    Unknown,
}

impl InstanceStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
            InstanceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UP" => Ok(InstanceStatus::Up),
            "DOWN" => Ok(InstanceStatus::Down),
            "STARTING" => Ok(InstanceStatus::Starting),
            "OUT_OF_SERVICE" => Ok(InstanceStatus::OutOfService),
            "UNKNOWN" => Ok(InstanceStatus::Unknown),
            other => Err(format!("Unknown instance status: {}", other)),
        }
    }
}

/// A single registered instance of an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    /// Unique instance identifier
    pub instance_id: String,

    /// Application name, upper-cased
    #[serde(rename = "app")]
    pub app_name: String,

    /// Host name the instance advertises
    pub host_name: String,

    /// IP address the instance advertises
    #[serde(default)]
    pub ip_addr: String,

    /// Plain port
    pub port: u16,

    /// TLS port, if any
    #[serde(default)]
    pub secure_port: Option<u16>,

    /// Virtual address clients look the instance up by
    #[serde(default)]
    pub vip_address: Option<String>,

    /// Secure virtual address
    #[serde(default)]
    pub secure_vip_address: Option<String>,

    /// Reported status
    #[serde(default)]
    pub status: InstanceStatus,

    /// Status forced by an operator, if any
    #[serde(default)]
    pub overridden_status: Option<InstanceStatus>,

    /// Lease timings
    #[serde(default)]
    pub lease_info: LeaseInfo,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Last time the registry changed this record (epoch millis)
    #[serde(default)]
    pub last_updated_timestamp: i64,

    /// Last local change not yet acknowledged by the registry (epoch millis)
    #[serde(default)]
    pub last_dirty_timestamp: i64,

    #[serde(skip)]
    dirty: bool,
}

impl InstanceInfo {
    /// Create an `UP` instance with a default lease
    pub fn new(
        app_name: impl Into<String>,
        instance_id: impl Into<String>,
        host_name: impl Into<String>,
        port: u16,
    ) -> Self {
        let now = now_millis();
        Self {
            instance_id: instance_id.into(),
            app_name: app_name.into().to_uppercase(),
            host_name: host_name.into(),
            ip_addr: String::new(),
            port,
            secure_port: None,
            vip_address: None,
            secure_vip_address: None,
            status: InstanceStatus::Up,
            overridden_status: None,
            lease_info: LeaseInfo::default(),
            metadata: HashMap::new(),
            last_updated_timestamp: now,
            last_dirty_timestamp: now,
            dirty: false,
        }
    }

    /// Replace the lease
    pub fn with_lease(mut self, lease: LeaseInfo) -> Self {
        self.lease_info = lease;
        self
    }

    /// Set the virtual address
    pub fn with_vip_address(mut self, vip: impl Into<String>) -> Self {
        self.vip_address = Some(vip.into());
        self
    }

    /// Set the advertised IP address
    pub fn with_ip_addr(mut self, ip: impl Into<String>) -> Self {
        self.ip_addr = ip.into();
        self
    }

    /// Whether a local change awaits registration
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flag a local change, stamping the dirty timestamp
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.last_dirty_timestamp = now_millis();
    }

    /// Clear the dirty flag once the registry has the change
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Effective status, honouring an operator override
    pub fn effective_status(&self) -> InstanceStatus {
        self.overridden_status.unwrap_or(self.status)
    }
}

/// All instances registered under one application name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Application name
    pub name: String,

    /// Registered instances
    #[serde(rename = "instance", default)]
    pub instances: Vec<InstanceInfo>,
}

impl Application {
    /// Instances whose effective status is `UP`
    pub fn up_instances(&self) -> impl Iterator<Item = &InstanceInfo> {
        self.instances
            .iter()
            .filter(|i| i.effective_status() == InstanceStatus::Up)
    }

    /// Look up an instance by ID
    pub fn instance(&self, id: &str) -> Option<&InstanceInfo> {
        self.instances.iter().find(|i| i.instance_id == id)
    }
}

/// The registry's view of every application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Applications {
    /// Version counter for delta fetches
    #[serde(rename = "versions__delta", default)]
    pub version_delta: String,

    /// Hash of status counts across all instances
    #[serde(rename = "apps__hashcode", default)]
    pub apps_hashcode: String,

    /// Registered applications
    #[serde(rename = "application", default)]
    pub applications: Vec<Application>,
}

impl Applications {
    /// Look up an application, ignoring case
    pub fn get(&self, name: &str) -> Option<&Application> {
        self.applications
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Total number of instances across all applications
    pub fn instance_count(&self) -> usize {
        self.applications.iter().map(|a| a.instances.len()).sum()
    }

    /// Instances advertising the given virtual address
    pub fn by_vip<'a>(&'a self, vip: &'a str) -> impl Iterator<Item = &'a InstanceInfo> + 'a {
        self.applications
            .iter()
            .flat_map(|a| a.instances.iter())
            .filter(move |i| i.vip_address.as_deref() == Some(vip))
    }
}
