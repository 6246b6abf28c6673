//! Kubernetes API access
//!
//! Builds kube clients from an explicitly read kubeconfig, probes API
//! reachability for the status intent and polls workload readiness for the
//! installers.

use anyhow::{anyhow, bail, Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::expand_home;

/// Fixed timeout for the status-intent API probe.
pub const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Resolve a kubeconfig path after `~` expansion, confined to its own
/// directory.
///
/// Paths containing `..` are refused outright, and after platform symlink
/// resolution the final path must still reside under the file's directory.
pub fn resolve_kubeconfig_path(path: &str) -> Result<PathBuf> {
    let expanded = expand_home(Path::new(path))?;

    if expanded
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        bail!(
            "failed to read kubeconfig file: path {} escapes its directory",
            path
        );
    }

    let dir = expanded.parent().ok_or_else(|| {
        anyhow!(
            "failed to read kubeconfig file: {} has no parent directory",
            path
        )
    })?;
    let canonical_dir = dir
        .canonicalize()
        .with_context(|| format!("failed to read kubeconfig file: {}", path))?;
    let canonical = expanded
        .canonicalize()
        .with_context(|| format!("failed to read kubeconfig file: {}", path))?;
    if !canonical.starts_with(&canonical_dir) {
        bail!(
            "failed to read kubeconfig file: {} resolves outside {}",
            path,
            canonical_dir.display()
        );
    }

    Ok(canonical)
}

/// Read and parse a kubeconfig through [`resolve_kubeconfig_path`].
pub fn read_kubeconfig(path: &str) -> Result<Kubeconfig> {
    let canonical = resolve_kubeconfig_path(path)?;

    let content = std::fs::read_to_string(&canonical)
        .with_context(|| format!("failed to read kubeconfig file: {}", canonical.display()))?;

    Kubeconfig::from_yaml(&content)
        .with_context(|| format!("failed to parse kubeconfig file: {}", canonical.display()))
}

/// Build a client for the given kubeconfig and optional context.
pub async fn client_for(kubeconfig: Kubeconfig, context: Option<&str>) -> Result<Client> {
    let options = KubeConfigOptions {
        context: context.map(String::from),
        ..Default::default()
    };
    let config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .context("failed to load kubeconfig")?;
    Client::try_from(config).context("failed to build Kubernetes client")
}

/// True when the API server answers a discovery call within `timeout`.
pub async fn probe_api(client: &Client, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, client.apiserver_version()).await {
        Ok(Ok(version)) => {
            debug!(version = %version.git_version, "API server answered");
            true
        }
        Ok(Err(e)) => {
            debug!(error = %e, "API probe failed");
            false
        }
        Err(_) => {
            debug!("API probe timed out");
            false
        }
    }
}

/// Wait until the deployment reports at least one available replica.
pub async fn wait_for_deployment(
    client: &Client,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<()> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(deployment) = api.get_opt(name).await? {
            let available = deployment
                .status
                .as_ref()
                .and_then(|s| s.available_replicas)
                .unwrap_or(0);
            if available >= 1 {
                return Ok(());
            }
            debug!(%name, available, "deployment not yet available");
        } else {
            debug!(%name, "deployment not found yet");
        }

        if Instant::now() + READINESS_POLL_INTERVAL > deadline {
            bail!(
                "deployment {}/{} did not become available within {:?}",
                namespace,
                name,
                timeout
            );
        }
        sleep(READINESS_POLL_INTERVAL).await;
    }
}

/// Wait until the daemonset reports all desired pods ready.
pub async fn wait_for_daemonset(
    client: &Client,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<()> {
    let api: Api<DaemonSet> = Api::namespaced(client.clone(), namespace);
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(daemonset) = api.get_opt(name).await? {
            if let Some(status) = daemonset.status.as_ref() {
                let desired = status.desired_number_scheduled;
                let ready = status.number_ready;
                if desired > 0 && ready >= desired {
                    return Ok(());
                }
                debug!(%name, desired, ready, "daemonset not yet ready");
            }
        } else {
            debug!(%name, "daemonset not found yet");
        }

        if Instant::now() + READINESS_POLL_INTERVAL > deadline {
            bail!(
                "daemonset {}/{} did not become ready within {:?}",
                namespace,
                name,
                timeout
            );
        }
        sleep(READINESS_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
  - name: kind-dev
    cluster:
      server: https://127.0.0.1:6443
contexts:
  - name: kind-dev
    context:
      cluster: kind-dev
      user: kind-dev
users:
  - name: kind-dev
    user: {}
current-context: kind-dev
"#;

    #[test]
    fn test_read_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(MINIMAL_KUBECONFIG.as_bytes()).unwrap();

        let kubeconfig = read_kubeconfig(path.to_str().unwrap()).unwrap();
        assert_eq!(kubeconfig.clusters.len(), 1);
        assert_eq!(kubeconfig.current_context.as_deref(), Some("kind-dev"));
    }

    #[test]
    fn test_read_kubeconfig_missing_file() {
        let err = read_kubeconfig("/nonexistent/dir/config").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("failed to read kubeconfig file"));
    }

    #[test]
    fn test_read_kubeconfig_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/../config", dir.path().display());
        let err = read_kubeconfig(&path).unwrap_err();
        assert!(err.to_string().contains("escapes its directory"));
    }

    #[test]
    fn test_read_kubeconfig_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("real-config");
        std::fs::write(&target, MINIMAL_KUBECONFIG).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("config");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = read_kubeconfig(link.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("resolves outside"));
    }
}
