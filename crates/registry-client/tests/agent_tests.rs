//! Registry agent lifecycle against the in-memory registry

use async_runtime_compat::prelude::SmolSpawner;
use registry_client::{
    ClientConfig, ClusterResolver, Error, InstanceInfo, RegistryAgent, StaticClusterResolver,
};
use std::sync::Arc;
use std::time::Duration;
use task_supervisor::{MetricsRegistry, MetricsSink};

mod common;
use common::endpoint;
use common::mock_registry::{MockFactory, MockRegistry};

struct Fixture {
    registry: Arc<MockRegistry>,
    factory: Arc<MockFactory>,
    agent: RegistryAgent,
}

fn fixture(config: ClientConfig) -> Fixture {
    let registry = MockRegistry::new();
    registry.set_applications(common::sample_applications("inventory", 2));
    let factory = MockFactory::new(Arc::clone(&registry));
    let resolver: Arc<dyn ClusterResolver> = Arc::new(StaticClusterResolver::new(
        "us-east-1",
        vec![endpoint("a"), endpoint("b")],
    ));

    let agent = RegistryAgent::builder(config)
        .instance(InstanceInfo::new("orders", "orders-1", "host-a", 8080))
        .resolver(resolver)
        .factory(factory.clone())
        .spawner(Arc::new(SmolSpawner))
        .build()
        .unwrap();

    Fixture {
        registry,
        factory,
        agent,
    }
}

#[smol_potat::test]
async fn test_start_fetches_and_registers() {
    let f = fixture(ClientConfig::default());

    f.agent.start().await.unwrap();

    assert_eq!(f.registry.operations(), vec!["fetch_all", "register"]);
    assert!(f.agent.is_registered());
    assert_eq!(f.agent.applications().unwrap().instance_count(), 2);
    assert!(f.agent.heartbeat_stats().is_some());
    assert!(f.agent.refresh_stats().is_some());

    // A second start is ignored
    f.agent.start().await.unwrap();
    assert_eq!(f.registry.calls().len(), 2);

    f.agent.shutdown().await;
}

#[smol_potat::test]
async fn test_registered_instance_carries_configured_lease() {
    let config = ClientConfig {
        lease_renewal_interval_secs: 10,
        lease_duration_secs: 40,
        fetch_registry: false,
        ..ClientConfig::default()
    };
    let f = fixture(config);

    f.agent.register().await.unwrap();

    let registered = &f.registry.registrations()[0];
    assert_eq!(registered.lease_info.renewal_interval_secs(), 10);
    assert_eq!(registered.lease_info.duration_secs(), 40);
}

#[smol_potat::test]
async fn test_renew_not_found_re_registers_dirty_instance() {
    let f = fixture(ClientConfig::default());
    f.agent.register().await.unwrap();
    let first = f.registry.registrations()[0].last_dirty_timestamp;

    f.registry.queue_heartbeat_statuses(&[404]);
    f.agent.renew().await.unwrap();

    assert_eq!(f.registry.operations(), vec!["register", "heartbeat", "register"]);
    let registrations = f.registry.registrations();
    assert!(registrations[1].last_dirty_timestamp >= first);
    assert!(f.agent.is_registered());
    assert!(!f.agent.instance().unwrap().is_dirty());
}

#[smol_potat::test]
async fn test_renew_success_stamps_lease() {
    let f = fixture(ClientConfig::default());
    assert_eq!(f.agent.instance().unwrap().lease_info.renewal_timestamp(), 0);

    f.agent.renew().await.unwrap();

    assert!(f.agent.instance().unwrap().lease_info.renewal_timestamp() > 0);
    assert!(f.agent.is_registered());
    assert_eq!(f.registry.operations(), vec!["heartbeat"]);
}

#[smol_potat::test]
async fn test_renew_rejected_is_an_error() {
    let f = fixture(ClientConfig::default());
    f.registry.queue_heartbeat_statuses(&[500]);

    let err = f.agent.renew().await.unwrap_err();
    assert!(err.to_string().contains("500"));
    assert!(!f.agent.is_registered());
}

#[smol_potat::test]
async fn test_refresh_without_applications_keeps_previous_view() {
    let f = fixture(ClientConfig::default());
    f.registry.set_fetch_status(503);

    assert!(f.agent.refresh_registry().await.is_err());
    assert!(f.agent.applications().is_none());

    f.registry.set_fetch_status(200);
    f.agent.refresh_registry().await.unwrap();
    assert_eq!(f.agent.applications().unwrap().applications[0].name, "INVENTORY");
}

#[smol_potat::test]
async fn test_refresh_uses_single_vip_address() {
    let config = ClientConfig {
        single_vip_address: Some("inventory.internal".to_string()),
        ..ClientConfig::default()
    };
    let f = fixture(config);

    f.agent.refresh_registry().await.unwrap();

    assert_eq!(f.registry.operations(), vec!["fetch_by_vip"]);
}

#[smol_potat::test]
async fn test_failover_is_invisible_to_the_agent() {
    let f = fixture(ClientConfig::default());
    f.registry.set_reachable(&endpoint("a"), false);

    f.agent.start().await.unwrap();

    assert!(f.agent.is_registered());
    assert_eq!(
        f.agent.transport().current_endpoint(),
        Some(endpoint("b"))
    );
    f.agent.shutdown().await;
}

#[smol_potat::test]
async fn test_shutdown_unregisters_once() {
    let f = fixture(ClientConfig::default());
    f.agent.start().await.unwrap();

    f.agent.shutdown().await;
    f.agent.shutdown().await;

    let operations = f.registry.operations();
    assert_eq!(operations.iter().filter(|op| *op == "cancel").count(), 1);
    assert!(!f.agent.is_registered());
    assert!(f.factory.is_shut_down());
    assert!(f.factory.created().iter().all(|t| t.is_shut_down()));
    assert!(f.agent.heartbeat_stats().is_none());
    assert!(f.agent.refresh_stats().is_none());
}

#[smol_potat::test]
async fn test_shutdown_keeps_registration_when_configured() {
    let config = ClientConfig {
        unregister_on_shutdown: false,
        ..ClientConfig::default()
    };
    let f = fixture(config);
    f.agent.start().await.unwrap();

    f.agent.shutdown().await;

    assert!(!f.registry.operations().contains(&"cancel".to_string()));
    assert!(f.factory.is_shut_down());
}

#[smol_potat::test]
async fn test_start_after_shutdown_fails() {
    let f = fixture(ClientConfig::default());
    f.agent.shutdown().await;

    assert!(f.agent.start().await.is_err());
    assert!(f.registry.calls().is_empty());
}

#[smol_potat::test]
async fn test_enforced_registration_failure_aborts_start() {
    let config = ClientConfig {
        enforce_registration_at_init: true,
        ..ClientConfig::default()
    };
    let f = fixture(config);
    f.registry.set_register_status(500);

    let result = f.agent.start().await;
    assert!(matches!(
        result,
        Err(Error::Registration { status: 500, .. })
    ));
    assert!(f.agent.heartbeat_stats().is_none());
    assert!(f.agent.refresh_stats().is_none());
    assert!(!f.agent.is_registered());

    // Nothing was left running, so start can be retried
    f.registry.set_register_status(204);
    f.agent.start().await.unwrap();

    assert_eq!(
        f.registry.operations(),
        vec!["fetch_all", "register", "fetch_all", "register"]
    );
    assert!(f.agent.is_registered());
    assert!(f.agent.heartbeat_stats().is_some());
    assert!(f.agent.refresh_stats().is_some());

    f.agent.shutdown().await;
}

#[smol_potat::test]
async fn test_unenforced_registration_failure_is_tolerated() {
    let f = fixture(ClientConfig::default());
    f.registry.set_register_status(500);

    f.agent.start().await.unwrap();

    assert!(!f.agent.is_registered());
    assert!(f.agent.heartbeat_stats().is_some());

    f.agent.shutdown().await;
    assert!(!f.registry.operations().contains(&"cancel".to_string()));
}

#[smol_potat::test]
async fn test_disabled_features_make_no_calls() {
    let config = ClientConfig {
        register_with_registry: false,
        fetch_registry: false,
        ..ClientConfig::default()
    };
    let f = fixture(config);

    f.agent.start().await.unwrap();

    assert!(f.registry.calls().is_empty());
    assert!(f.agent.heartbeat_stats().is_none());
    assert!(f.agent.refresh_stats().is_none());

    f.agent.shutdown().await;
}

#[smol_potat::test]
async fn test_dropping_the_agent_stops_its_cycles() {
    let registry = MockRegistry::new();
    registry.set_applications(common::sample_applications("inventory", 2));
    let metrics = Arc::new(MetricsRegistry::new());
    let config = ClientConfig {
        registry_fetch_interval_secs: 1,
        register_with_registry: false,
        ..ClientConfig::default()
    };
    let agent = RegistryAgent::builder(config)
        .resolver(Arc::new(StaticClusterResolver::new(
            "us-east-1",
            vec![endpoint("a")],
        )))
        .factory(MockFactory::new(Arc::clone(&registry)))
        .spawner(Arc::new(SmolSpawner))
        .metrics(metrics.clone() as Arc<dyn MetricsSink>)
        .build()
        .unwrap();

    agent.start().await.unwrap();
    let stats = metrics.get("cache-refresh").unwrap();
    let other_handle = agent.clone();
    drop(agent);
    drop(other_handle);

    assert!(metrics.names().is_empty());
    smol::Timer::after(Duration::from_millis(1500)).await;
    assert_eq!(stats.success_count() + stats.failure_count(), 0);
    assert_eq!(registry.operations(), vec!["fetch_all"]);
}

#[test]
fn test_invalid_config_is_rejected_at_build() {
    let config = ClientConfig {
        service_urls: Vec::new(),
        ..ClientConfig::default()
    };

    let result = RegistryAgent::builder(config)
        .spawner(Arc::new(SmolSpawner))
        .build();
    assert!(matches!(result, Err(Error::Config(_))));
}
