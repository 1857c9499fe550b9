use super::load_config;
use anyhow::Result;
use async_runtime_compat::prelude::TokioSpawner;
use registry_client::{InstanceInfo, RegistryAgent};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use task_supervisor::MetricsRegistry;
use tracing::info;

pub struct RunOptions {
    pub app: String,
    pub instance_id: Option<String>,
    pub host: String,
    pub port: u16,
    pub duration: Option<u64>,
    pub report_interval: u64,
}

pub async fn run(config_path: &Path, options: RunOptions) -> Result<()> {
    let config = load_config(config_path).await?;

    let instance_id = options
        .instance_id
        .unwrap_or_else(|| format!("{}-{}", options.host, uuid::Uuid::new_v4().simple()));
    let instance = InstanceInfo::new(&options.app, instance_id, &options.host, options.port);
    info!(
        "Running {}/{} at {}:{}",
        instance.app_name, instance.instance_id, instance.host_name, instance.port
    );

    let metrics = Arc::new(MetricsRegistry::new());
    let agent = RegistryAgent::builder(config)
        .instance(instance)
        .spawner(Arc::new(TokioSpawner::new(tokio::runtime::Handle::current())))
        .metrics(metrics.clone())
        .build()?;

    agent.start().await?;

    let deadline = options.duration.map(Duration::from_secs);
    let report_every = Duration::from_secs(options.report_interval.max(1));
    let wait = async {
        let mut ticker = tokio::time::interval(report_every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            report(&agent, &metrics);
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
        _ = sleep_or_forever(deadline) => info!("Run duration elapsed, shutting down"),
        _ = wait => {}
    }

    report(&agent, &metrics);
    agent.shutdown().await;
    Ok(())
}

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

fn report(agent: &RegistryAgent, metrics: &MetricsRegistry) {
    let known = agent
        .applications()
        .map(|apps| apps.instance_count())
        .unwrap_or(0);
    info!(
        "registered={} known_instances={}",
        agent.is_registered(),
        known
    );
    for (name, stats) in metrics.snapshot() {
        info!(
            "{}: success={} timeouts={} rejected={} failures={} pool_used={}",
            name, stats.success, stats.timeouts, stats.rejected, stats.failures, stats.pool_used
        );
    }
}
