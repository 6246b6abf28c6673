//! Mirror and local registry orchestration
//!
//! Two registry roles share one provisioning path: pull-through caches for
//! mirrored upstream registries, and a single fixed-name local OCI registry
//! for developer-pushed images. Registry containers are created before the
//! cluster and connected to its network afterwards; cleanup on delete is
//! best-effort.

use anyhow::{anyhow, Result};

use super::docker::{ContainerEngine, ContainerRunSpec};
use crate::config::{Distribution, MirrorRegistry};

/// Fixed name (and volume name) of the local registry container.
pub const LOCAL_REGISTRY_NAME: &str = "ksail-registry";

/// Host routed to the local registry inside the cluster.
pub const LOCAL_REGISTRY_HOST: &str = "registry.ksail.dev";

/// Registry image used for both roles.
pub const REGISTRY_IMAGE: &str = "registry:3";

/// Container-side registry port.
pub const REGISTRY_PORT: u16 = 5000;

/// Default host port for the local registry when the spec says 0.
pub const DEFAULT_LOCAL_HOST_PORT: u16 = 5000;

const REGISTRY_DATA_DIR: &str = "/var/lib/registry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryRole {
    Mirror,
    Local,
}

/// A registry container the engine manages.
#[derive(Debug, Clone)]
pub struct RegistryDescriptor {
    pub name: String,
    pub host: String,
    /// Host port binding; `None` lets the engine pick one.
    pub host_port: Option<u16>,
    /// Upstream the pull-through cache proxies to (mirrors only).
    pub upstream_url: Option<String>,
    pub volume: String,
    pub role: RegistryRole,
}

impl RegistryDescriptor {
    /// Endpoint the cluster's container runtime reaches the registry at.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.name, REGISTRY_PORT)
    }

    fn run_spec(&self) -> ContainerRunSpec {
        let env = self
            .upstream_url
            .as_ref()
            .map(|url| vec![("REGISTRY_PROXY_REMOTEURL".to_string(), url.clone())])
            .unwrap_or_default();

        ContainerRunSpec {
            name: self.name.clone(),
            image: REGISTRY_IMAGE.to_string(),
            host_port: self.host_port,
            container_port: REGISTRY_PORT,
            volume: Some((self.volume.clone(), REGISTRY_DATA_DIR.to_string())),
            env,
            network: None,
        }
    }
}

/// Deterministic mirror container name: `docker.io` becomes
/// `kind-docker-io` / `k3d-docker-io`.
pub fn mirror_name(distribution: Distribution, host: &str) -> String {
    let slug: String = host
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}-{}", distribution.context_prefix(), slug)
}

pub fn mirror_descriptor(distribution: Distribution, mirror: &MirrorRegistry) -> RegistryDescriptor {
    let name = mirror_name(distribution, &mirror.host);
    RegistryDescriptor {
        volume: name.clone(),
        name,
        host: mirror.host.trim().to_string(),
        host_port: None,
        upstream_url: Some(mirror.upstream_url.trim().to_string()),
        role: RegistryRole::Mirror,
    }
}

pub fn local_descriptor(host_port: u16) -> RegistryDescriptor {
    let host_port = if host_port == 0 {
        DEFAULT_LOCAL_HOST_PORT
    } else {
        host_port
    };
    RegistryDescriptor {
        name: LOCAL_REGISTRY_NAME.to_string(),
        host: LOCAL_REGISTRY_HOST.to_string(),
        host_port: Some(host_port),
        upstream_url: None,
        volume: LOCAL_REGISTRY_NAME.to_string(),
        role: RegistryRole::Local,
    }
}

/// Ensure the registry container exists and is running.
pub async fn ensure_registry(
    engine: &dyn ContainerEngine,
    descriptor: &RegistryDescriptor,
) -> Result<()> {
    let info = engine.container_info(&descriptor.name).await?;
    if !info.exists {
        engine.create_container(&descriptor.run_spec()).await?;
        engine.start_container(&descriptor.name).await?;
    } else if !info.running {
        engine.start_container(&descriptor.name).await?;
    }
    Ok(())
}

/// Connect a registry container to the cluster network if not yet attached.
pub async fn connect_registry(
    engine: &dyn ContainerEngine,
    network: &str,
    descriptor: &RegistryDescriptor,
) -> Result<()> {
    let info = engine.container_info(&descriptor.name).await?;
    if !info.exists {
        return Err(anyhow!(
            "registry container {} does not exist",
            descriptor.name
        ));
    }
    if info.networks.iter().any(|n| n == network) {
        return Ok(());
    }
    engine.connect_network(network, &descriptor.name).await
}

/// Stop and remove registry containers, optionally their volumes.
///
/// Failures are collected instead of propagated; the caller downgrades them
/// to warnings.
pub async fn cleanup_registries(
    engine: &dyn ContainerEngine,
    descriptors: &[RegistryDescriptor],
    remove_volumes: bool,
) -> Vec<anyhow::Error> {
    let mut failures = Vec::new();

    for descriptor in descriptors {
        match engine.container_info(&descriptor.name).await {
            Ok(info) if info.exists => {
                if info.running {
                    if let Err(e) = engine.stop_container(&descriptor.name, 10).await {
                        failures.push(e);
                        continue;
                    }
                }
                if let Err(e) = engine.remove_container(&descriptor.name, true).await {
                    failures.push(e);
                    continue;
                }
            }
            Ok(_) => {}
            Err(e) => {
                failures.push(e);
                continue;
            }
        }

        if remove_volumes {
            if let Err(e) = engine.remove_volume(&descriptor.volume, true).await {
                failures.push(e);
            }
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::docker::testing::FakeEngine;

    fn docker_mirror() -> MirrorRegistry {
        MirrorRegistry {
            host: "docker.io".to_string(),
            upstream_url: "https://registry-1.docker.io".to_string(),
        }
    }

    #[test]
    fn test_mirror_name_slug() {
        assert_eq!(
            mirror_name(Distribution::Kind, "docker.io"),
            "kind-docker-io"
        );
        assert_eq!(mirror_name(Distribution::K3d, "ghcr.io"), "k3d-ghcr-io");
        assert_eq!(
            mirror_name(Distribution::K3d, "registry.k8s.io"),
            "k3d-registry-k8s-io"
        );
    }

    #[test]
    fn test_mirror_descriptor_env_and_endpoint() {
        let descriptor = mirror_descriptor(Distribution::Kind, &docker_mirror());
        assert_eq!(descriptor.name, "kind-docker-io");
        assert_eq!(descriptor.volume, "kind-docker-io");
        assert_eq!(descriptor.endpoint(), "http://kind-docker-io:5000");
        let spec = descriptor.run_spec();
        assert_eq!(spec.container_port, 5000);
        assert_eq!(spec.host_port, None);
        assert_eq!(
            spec.env,
            vec![(
                "REGISTRY_PROXY_REMOTEURL".to_string(),
                "https://registry-1.docker.io".to_string()
            )]
        );
    }

    #[test]
    fn test_local_descriptor_default_port() {
        assert_eq!(local_descriptor(0).host_port, Some(5000));
        assert_eq!(local_descriptor(5555).host_port, Some(5555));
        let spec = local_descriptor(0).run_spec();
        assert!(spec.env.is_empty());
        assert_eq!(spec.volume, Some(("ksail-registry".into(), "/var/lib/registry".into())));
    }

    #[tokio::test]
    async fn test_ensure_registry_creates_and_starts() {
        let engine = FakeEngine::new();
        let descriptor = mirror_descriptor(Distribution::Kind, &docker_mirror());
        ensure_registry(engine.as_ref(), &descriptor).await.unwrap();
        assert_eq!(
            engine.recorded_ops(),
            vec!["create kind-docker-io", "start kind-docker-io"]
        );
    }

    #[tokio::test]
    async fn test_ensure_registry_starts_stopped_container() {
        let engine = FakeEngine::new();
        engine.add_container("kind-docker-io", false, &[]);
        let descriptor = mirror_descriptor(Distribution::Kind, &docker_mirror());
        ensure_registry(engine.as_ref(), &descriptor).await.unwrap();
        assert_eq!(engine.recorded_ops(), vec!["start kind-docker-io"]);
    }

    #[tokio::test]
    async fn test_ensure_registry_noop_when_running() {
        let engine = FakeEngine::new();
        engine.add_container("kind-docker-io", true, &[]);
        let descriptor = mirror_descriptor(Distribution::Kind, &docker_mirror());
        ensure_registry(engine.as_ref(), &descriptor).await.unwrap();
        assert!(engine.recorded_ops().is_empty());
    }

    #[tokio::test]
    async fn test_connect_registry_skips_when_attached() {
        let engine = FakeEngine::new();
        engine.add_container("kind-docker-io", true, &["kind"]);
        let descriptor = mirror_descriptor(Distribution::Kind, &docker_mirror());
        connect_registry(engine.as_ref(), "kind", &descriptor)
            .await
            .unwrap();
        assert!(engine.recorded_ops().is_empty());
    }

    #[tokio::test]
    async fn test_connect_registry_attaches() {
        let engine = FakeEngine::new();
        engine.add_container("kind-docker-io", true, &[]);
        let descriptor = mirror_descriptor(Distribution::Kind, &docker_mirror());
        connect_registry(engine.as_ref(), "kind", &descriptor)
            .await
            .unwrap();
        assert_eq!(engine.recorded_ops(), vec!["connect kind kind-docker-io"]);
    }

    #[tokio::test]
    async fn test_cleanup_collects_failures() {
        let engine = FakeEngine::new();
        engine.add_container("ksail-registry", true, &[]);
        engine.add_container("kind-docker-io", true, &[]);
        engine.fail_on("kind-docker-io");

        let descriptors = vec![
            local_descriptor(0),
            mirror_descriptor(Distribution::Kind, &docker_mirror()),
        ];
        let failures = cleanup_registries(engine.as_ref(), &descriptors, true).await;
        assert_eq!(failures.len(), 1);
        // The healthy registry was still removed.
        assert!(engine
            .recorded_ops()
            .contains(&"remove ksail-registry".to_string()));
        assert!(engine
            .recorded_ops()
            .contains(&"remove-volume ksail-registry".to_string()));
    }

    #[tokio::test]
    async fn test_cleanup_missing_container_is_noop() {
        let engine = FakeEngine::new();
        let failures =
            cleanup_registries(engine.as_ref(), &[local_descriptor(0)], false).await;
        assert!(failures.is_empty());
        assert!(engine.recorded_ops().is_empty());
    }
}
