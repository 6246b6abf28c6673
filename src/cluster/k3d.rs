//! K3d cluster adapter
//!
//! All lifecycle transitions go through the `k3d` CLI; the cluster name is
//! taken from the config handed to `--config`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use super::provisioner::{run_cli, write_config_file, Provisioner};
use crate::config::k3d::K3dConfig;

pub struct K3dProvisioner {
    config: K3dConfig,
}

impl K3dProvisioner {
    pub fn new(config: K3dConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Provisioner for K3dProvisioner {
    async fn create(&self, _name: &str) -> Result<()> {
        let rendered = serde_yaml::to_string(&self.config)?;
        let config_file = write_config_file(&rendered)?;
        let config_path = config_file.path().to_string_lossy().to_string();
        run_cli("k3d", &["cluster", "create", "--config", &config_path]).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if !self.exists(name).await? {
            return Ok(());
        }
        run_cli("k3d", &["cluster", "delete", name]).await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        if !self.exists(name).await? {
            bail!("cluster {} does not exist", name);
        }
        run_cli("k3d", &["cluster", "start", name]).await?;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        if !self.exists(name).await? {
            bail!("cluster {} does not exist", name);
        }
        run_cli("k3d", &["cluster", "stop", name]).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let stdout = run_cli("k3d", &["cluster", "list", "-o", "json"]).await?;
        parse_cluster_list(&stdout)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.list().await?.iter().any(|c| c == name))
    }
}

/// Cluster names out of `k3d cluster list -o json`.
fn parse_cluster_list(stdout: &str) -> Result<Vec<String>> {
    let clusters: Vec<serde_json::Value> =
        serde_json::from_str(stdout).context("parsing k3d cluster list JSON")?;
    Ok(clusters
        .iter()
        .filter_map(|c| c.get("name").and_then(|n| n.as_str()))
        .map(String::from)
        .collect())
}
