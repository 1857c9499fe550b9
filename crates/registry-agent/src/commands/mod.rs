pub mod apps;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use registry_client::ClientConfig;
use std::path::Path;

/// Load the client configuration, falling back to defaults when the default
/// file is absent
pub async fn load_config(config_path: &Path) -> Result<ClientConfig> {
    if !config_path.exists() && config_path == Path::new("registry-client.yaml") {
        tracing::debug!("No {} found, using defaults", config_path.display());
        return Ok(ClientConfig::default());
    }

    ClientConfig::from_file(config_path)
        .await
        .with_context(|| format!("Failed to load {}", config_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_default_file_uses_defaults() {
        let config = load_config(Path::new("registry-client.yaml")).await.unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry-client.yaml");

        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to load"));
    }

    #[tokio::test]
    async fn test_explicit_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "region: eu-west-1\nregistry_fetch_interval_secs: 5").unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.registry_fetch_interval_secs, 5);
        assert_eq!(config.service_urls, ClientConfig::default().service_urls);
    }
}
