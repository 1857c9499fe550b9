use super::load_config;
use anyhow::{Context, Result};
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating {}...", config_path.display());

    let config = load_config(config_path).await?;
    config.validate().context("Invalid configuration")?;

    println!("✓ Configuration valid");
    println!("  Region: {}", config.region);
    println!("  Registry servers: {}", config.service_urls.len());
    for url in &config.service_urls {
        println!("    - {}", url);
    }
    println!(
        "  Lease: renew every {}s, expire after {}s",
        config.lease_info().renewal_interval_secs(),
        config.lease_info().duration_secs()
    );
    println!(
        "  Registry fetch: {} (every {}s)",
        enabled(config.fetch_registry),
        config.registry_fetch_interval_secs
    );
    println!("  Registration: {}", enabled(config.register_with_registry));

    if let Some(vip) = &config.single_vip_address {
        println!("  Fetching only VIP '{}'", vip);
    }
    if !config.fetch_remote_regions.is_empty() {
        println!(
            "  Remote regions: {}",
            config.fetch_remote_regions.join(", ")
        );
    }

    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag { "enabled" } else { "disabled" }
}
