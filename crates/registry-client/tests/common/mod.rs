//! Common test utilities for registry client integration tests

#![allow(dead_code)]

pub mod mock_registry;
pub mod test_server;

use registry_client::{Application, Applications, Endpoint, InstanceInfo};

/// Endpoint on a fake host, distinguishable by name
pub fn endpoint(host: &str) -> Endpoint {
    Endpoint::new(host, 8761, false, "/eureka/")
}

/// A registry view with one application of `count` instances
pub fn sample_applications(app: &str, count: usize) -> Applications {
    let instances = (0..count)
        .map(|i| InstanceInfo::new(app, format!("{}-{}", app, i), format!("host-{}", i), 8080))
        .collect();

    Applications {
        version_delta: "1".to_string(),
        apps_hashcode: format!("UP_{}_", count),
        applications: vec![Application {
            name: app.to_uppercase(),
            instances,
        }],
    }
}
