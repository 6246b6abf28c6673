//! Kind cluster adapter
//!
//! Create/delete/list go through the `kind` CLI. Kind has no start/stop
//! verbs, so those transitions drive the node containers attached to the
//! shared `kind` network through the container engine; node containers are
//! discovered by network inspection, never named here.

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::docker::EngineFactory;
use super::provisioner::{run_cli, write_config_file, Provisioner};
use crate::config::kind::KindConfig;

/// Shared container network for all Kind clusters.
const KIND_NETWORK: &str = "kind";

pub struct KindProvisioner {
    config: KindConfig,
    factory: EngineFactory,
}

impl KindProvisioner {
    pub fn new(config: KindConfig, factory: EngineFactory) -> Self {
        Self { config, factory }
    }

    /// Node containers of `name`, discovered from the `kind` network.
    ///
    /// Kind names them `{name}-control-plane`, `{name}-worker`, ... so a
    /// prefix match on the attached members is enough.
    async fn node_containers(&self, name: &str) -> Result<Vec<String>> {
        let engine = (self.factory)()?;
        let network = engine.network_info(KIND_NETWORK).await?;
        let prefix = format!("{}-", name);
        Ok(network
            .containers
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect())
    }
}

#[async_trait]
impl Provisioner for KindProvisioner {
    async fn create(&self, name: &str) -> Result<()> {
        let rendered = serde_yaml::to_string(&self.config)?;
        let config_file = write_config_file(&rendered)?;
        let config_path = config_file.path().to_string_lossy().to_string();
        run_cli(
            "kind",
            &["create", "cluster", "--name", name, "--config", &config_path],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if !self.exists(name).await? {
            return Ok(());
        }
        run_cli("kind", &["delete", "cluster", "--name", name]).await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        let nodes = self.node_containers(name).await?;
        if nodes.is_empty() {
            bail!("cluster {} does not exist", name);
        }
        let engine = (self.factory)()?;
        for node in nodes {
            engine.start_container(&node).await?;
        }
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let nodes = self.node_containers(name).await?;
        if nodes.is_empty() {
            bail!("cluster {} does not exist", name);
        }
        let engine = (self.factory)()?;
        for node in nodes {
            engine.stop_container(&node, 30).await?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let stdout = run_cli("kind", &["get", "clusters"]).await?;
        Ok(parse_cluster_list(&stdout))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.list().await?.iter().any(|c| c == name))
    }
}

/// One cluster name per stdout line; blank lines ignored.
fn parse_cluster_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cluster_list() {
        assert_eq!(parse_cluster_list("dev\nstaging\n"), vec!["dev", "staging"]);
        assert_eq!(parse_cluster_list(""), Vec::<String>::new());
        assert_eq!(parse_cluster_list("\n  \n"), Vec::<String>::new());
    }
}
