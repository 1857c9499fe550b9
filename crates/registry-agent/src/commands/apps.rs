use super::load_config;
use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use registry_client::{Applications, InstanceStatus, RegistryAgent};
use std::path::Path;

pub async fn run(config_path: &Path, format: String) -> Result<()> {
    if format != "table" && format != "json" {
        anyhow::bail!("Invalid format: {}. Must be 'table' or 'json'", format);
    }

    let mut config = load_config(config_path).await?;
    // One-shot read: never register from here
    config.register_with_registry = false;

    let agent = RegistryAgent::builder(config).build()?;
    let fetched = agent.refresh_registry().await;
    agent.shutdown().await;
    fetched.context("Failed to fetch the registry")?;

    let applications = agent.applications().unwrap_or_default();
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&applications)?);
    } else {
        display_table(&applications);
    }

    Ok(())
}

fn display_table(applications: &Applications) {
    let mut table = Table::new();
    table.set_header(vec!["APPLICATION", "INSTANCE", "ADDRESS", "STATUS", "LEASE"]);

    for app in &applications.applications {
        for instance in &app.instances {
            let status = instance.effective_status();
            let color = match status {
                InstanceStatus::Up => Color::Green,
                InstanceStatus::Starting => Color::Yellow,
                InstanceStatus::Down | InstanceStatus::OutOfService => Color::Red,
                InstanceStatus::Unknown => Color::DarkGrey,
            };
            let lease = &instance.lease_info;

            table.add_row(vec![
                Cell::new(&app.name),
                Cell::new(&instance.instance_id),
                Cell::new(format!("{}:{}", instance.host_name, instance.port)),
                Cell::new(status.as_str()).fg(color),
                Cell::new(format!(
                    "{}s/{}s",
                    lease.renewal_interval_secs(),
                    lease.duration_secs()
                )),
            ]);
        }
    }

    println!("{}", table);
    println!(
        "{} applications, {} instances (hashcode {})",
        applications.applications.len(),
        applications.instance_count(),
        applications.apps_hashcode
    );
}
