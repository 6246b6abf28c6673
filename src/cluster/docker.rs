#![allow(deprecated)]

//! Container-engine access
//!
//! The lifecycle engine multiplexes over a Docker-compatible API through the
//! [`ContainerEngine`] trait; [`DockerManager`] is the bollard-backed
//! implementation. Stages acquire a client through an [`EngineFactory`] and
//! drop it at stage end, so tests inject an in-memory fake instead of a
//! process-wide override.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{EndpointSettings, HostConfig, PortBinding};
use bollard::network::{ConnectNetworkOptions, InspectNetworkOptions};
use bollard::volume::RemoveVolumeOptions;
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of a network inspection.
#[derive(Debug, Clone, Default)]
pub struct NetworkInfo {
    pub exists: bool,
    pub id: Option<String>,
    /// Names of containers attached to the network.
    pub containers: Vec<String>,
}

/// Result of a container inspection.
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    pub exists: bool,
    pub running: bool,
    /// Networks the container is attached to.
    pub networks: Vec<String>,
}

/// Everything needed to create a registry container.
#[derive(Debug, Clone, Default)]
pub struct ContainerRunSpec {
    pub name: String,
    pub image: String,
    /// Host port binding; `None` lets the engine pick an ephemeral port.
    pub host_port: Option<u16>,
    pub container_port: u16,
    /// Named volume and its mount target.
    pub volume: Option<(String, String)>,
    pub env: Vec<(String, String)>,
    pub network: Option<String>,
}

/// Capabilities of a Docker-compatible container engine consumed by the
/// lifecycle engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn network_info(&self, name: &str) -> Result<NetworkInfo>;
    async fn container_info(&self, name: &str) -> Result<ContainerInfo>;
    async fn create_container(&self, spec: &ContainerRunSpec) -> Result<String>;
    async fn start_container(&self, name: &str) -> Result<()>;
    async fn stop_container(&self, name: &str, timeout_secs: i64) -> Result<()>;
    async fn remove_container(&self, name: &str, force: bool) -> Result<()>;
    async fn connect_network(&self, network: &str, container: &str) -> Result<()>;
    async fn remove_volume(&self, name: &str, force: bool) -> Result<()>;
}

/// Creates a fresh engine client for a stage.
pub type EngineFactory = Arc<dyn Fn() -> Result<Arc<dyn ContainerEngine>> + Send + Sync>;

/// Factory connecting to the local Docker daemon.
pub fn docker_engine_factory() -> EngineFactory {
    Arc::new(|| {
        let manager = DockerManager::new()?;
        Ok(Arc::new(manager) as Arc<dyn ContainerEngine>)
    })
}

/// Docker container and network management via bollard.
pub struct DockerManager {
    client: Docker,
}

impl DockerManager {
    pub fn new() -> Result<Self> {
        let client = Docker::connect_with_local_defaults()
            .context("failed to connect to the Docker daemon")?;
        Ok(Self { client })
    }

    /// Pull the image if it is not present locally.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.client.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });
        let mut stream = self.client.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.with_context(|| format!("failed to pull image {}", image))?;
        }

        Ok(())
    }
}

/// True when the error is the daemon saying "no such object".
fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerEngine for DockerManager {
    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .context("container engine is not reachable")?;
        Ok(())
    }

    async fn network_info(&self, name: &str) -> Result<NetworkInfo> {
        match self
            .client
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(network) => {
                let containers = network
                    .containers
                    .unwrap_or_default()
                    .into_values()
                    .filter_map(|c| c.name)
                    .collect();
                Ok(NetworkInfo {
                    exists: true,
                    id: network.id,
                    containers,
                })
            }
            Err(e) if is_not_found(&e) => Ok(NetworkInfo::default()),
            Err(e) => Err(e).with_context(|| format!("failed to inspect network {}", name)),
        }
    }

    async fn container_info(&self, name: &str) -> Result<ContainerInfo> {
        match self
            .client
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => {
                let running = info
                    .state
                    .as_ref()
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                let networks = info
                    .network_settings
                    .and_then(|s| s.networks)
                    .map(|n| n.into_keys().collect())
                    .unwrap_or_default();
                Ok(ContainerInfo {
                    exists: true,
                    running,
                    networks,
                })
            }
            Err(e) if is_not_found(&e) => Ok(ContainerInfo::default()),
            Err(e) => Err(e).with_context(|| format!("failed to inspect container {}", name)),
        }
    }

    async fn create_container(&self, spec: &ContainerRunSpec) -> Result<String> {
        self.ensure_image(&spec.image).await?;

        let container_port = format!("{}/tcp", spec.container_port);

        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        exposed_ports.insert(container_port.clone(), HashMap::new());

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        port_bindings.insert(
            container_port,
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: spec.host_port.map(|p| p.to_string()),
            }]),
        );

        let binds = spec
            .volume
            .as_ref()
            .map(|(volume, target)| vec![format!("{}:{}", volume, target)]);

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds,
            network_mode: spec.network.clone(),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            env: if env.is_empty() { None } else { Some(env) },
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                container_config,
            )
            .await
            .with_context(|| format!("failed to create container {}", spec.name))?;

        Ok(response.id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.client
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .with_context(|| format!("failed to start container {}", name))
    }

    async fn stop_container(&self, name: &str, timeout_secs: i64) -> Result<()> {
        self.client
            .stop_container(name, Some(StopContainerOptions { t: timeout_secs }))
            .await
            .with_context(|| format!("failed to stop container {}", name))
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        self.client
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .with_context(|| format!("failed to remove container {}", name))
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        self.client
            .connect_network(
                network,
                ConnectNetworkOptions {
                    container: container.to_string(),
                    endpoint_config: EndpointSettings::default(),
                },
            )
            .await
            .with_context(|| {
                format!(
                    "failed to connect container {} to network {}",
                    container, network
                )
            })
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        self.client
            .remove_volume(name, Some(RemoveVolumeOptions { force }))
            .await
            .with_context(|| format!("failed to remove volume {}", name))
    }
}
