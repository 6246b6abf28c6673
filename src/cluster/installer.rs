//! Post-create installs
//!
//! Cilium and metrics-server are installed through Helm after a successful
//! cluster create. Installs are strictly ordered: metrics-server needs a
//! functional pod network, so Cilium always goes first when both are
//! selected. Readiness is polled through the Kubernetes API, bounded by the
//! spec's connection timeout.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{Cni, Distribution, Toggle};
use crate::k8s;

const CILIUM_REPO: (&str, &str) = ("cilium", "https://helm.cilium.io/");
const METRICS_SERVER_REPO: (&str, &str) = (
    "metrics-server",
    "https://kubernetes-sigs.github.io/metrics-server/",
);

/// What to install after cluster create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallTarget {
    Cilium,
    MetricsServer,
}

/// Install order for the given spec, per the capability asymmetry between
/// distributions: K3d ships metrics-server by default (its presence is
/// steered through K3s extra args instead), Kind does not.
pub fn plan_installs(
    cni: Cni,
    metrics_server: Toggle,
    distribution: Distribution,
) -> Vec<InstallTarget> {
    let mut plan = Vec::new();
    if cni == Cni::Cilium {
        plan.push(InstallTarget::Cilium);
    }
    if metrics_server.is_enabled() && distribution == Distribution::Kind {
        plan.push(InstallTarget::MetricsServer);
    }
    plan
}

/// One Helm-driven install.
#[async_trait]
pub trait Installer: Send + Sync {
    fn target(&self) -> InstallTarget;
    async fn install(&self) -> Result<()>;
    async fn wait_for_readiness(&self) -> Result<()>;
}

/// Builds installers for the engine; tests substitute fakes.
pub type InstallerFactory = Arc<dyn Fn(InstallTarget) -> Result<Box<dyn Installer>> + Send + Sync>;

/// Factory producing Helm-backed installers bound to the given kubeconfig.
pub fn helm_installer_factory(
    kubeconfig: String,
    context: Option<String>,
    timeout: Duration,
) -> InstallerFactory {
    Arc::new(move |target| {
        let path = k8s::resolve_kubeconfig_path(&kubeconfig)?;
        let installer = match target {
            InstallTarget::Cilium => HelmInstaller::cilium(path, context.clone(), timeout),
            InstallTarget::MetricsServer => {
                HelmInstaller::metrics_server(path, context.clone(), timeout)
            }
        };
        Ok(Box::new(installer) as Box<dyn Installer>)
    })
}

/// Chart coordinates for one release.
#[derive(Debug, Clone)]
struct HelmChart {
    repo_name: &'static str,
    repo_url: &'static str,
    chart: String,
    release: &'static str,
    namespace: &'static str,
    set_values: Vec<String>,
}

/// Which workload signals readiness for a release.
#[derive(Debug, Clone)]
enum Workload {
    Deployment { namespace: &'static str, name: &'static str },
    DaemonSet { namespace: &'static str, name: &'static str },
}

pub struct HelmInstaller {
    target: InstallTarget,
    chart: HelmChart,
    workload: Workload,
    kubeconfig: PathBuf,
    context: Option<String>,
    timeout: Duration,
}

impl HelmInstaller {
    pub fn cilium(kubeconfig: PathBuf, context: Option<String>, timeout: Duration) -> Self {
        Self {
            target: InstallTarget::Cilium,
            chart: HelmChart {
                repo_name: CILIUM_REPO.0,
                repo_url: CILIUM_REPO.1,
                chart: format!("{}/cilium", CILIUM_REPO.0),
                release: "cilium",
                namespace: "kube-system",
                set_values: vec!["operator.replicas=1".to_string()],
            },
            workload: Workload::DaemonSet {
                namespace: "kube-system",
                name: "cilium",
            },
            kubeconfig,
            context,
            timeout,
        }
    }

    pub fn metrics_server(kubeconfig: PathBuf, context: Option<String>, timeout: Duration) -> Self {
        Self {
            target: InstallTarget::MetricsServer,
            chart: HelmChart {
                repo_name: METRICS_SERVER_REPO.0,
                repo_url: METRICS_SERVER_REPO.1,
                chart: format!("{}/metrics-server", METRICS_SERVER_REPO.0),
                release: "metrics-server",
                namespace: "kube-system",
                // Kind node kubelets serve self-signed certs.
                set_values: vec!["args={--kubelet-insecure-tls}".to_string()],
            },
            workload: Workload::Deployment {
                namespace: "kube-system",
                name: "metrics-server",
            },
            kubeconfig,
            context,
            timeout,
        }
    }

    async fn run_helm(&self, args: &[&str]) -> Result<String> {
        debug!(?args, "running helm");

        let output = Command::new("helm")
            .args(args)
            .env("KUBECONFIG", &self.kubeconfig)
            .output()
            .await
            .context("running helm")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "helm {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// `helm repo add`, tolerating a repo that already exists.
    async fn add_repo(&self) -> Result<()> {
        let result = self
            .run_helm(&["repo", "add", self.chart.repo_name, self.chart.repo_url])
            .await;
        if let Err(e) = result {
            if !e.to_string().contains("already exists") {
                return Err(e);
            }
            debug!(repo = self.chart.repo_name, "helm repository already exists");
        }
        self.run_helm(&["repo", "update", self.chart.repo_name])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Installer for HelmInstaller {
    fn target(&self) -> InstallTarget {
        self.target
    }

    async fn install(&self) -> Result<()> {
        which::which("helm").context("helm CLI not found on PATH")?;
        self.add_repo().await?;

        let timeout = format!("{}s", self.timeout.as_secs());
        let mut args: Vec<&str> = vec![
            "upgrade",
            "--install",
            self.chart.release,
            &self.chart.chart,
            "--namespace",
            self.chart.namespace,
            "--create-namespace",
            "--timeout",
            &timeout,
        ];
        for value in &self.chart.set_values {
            args.push("--set");
            args.push(value);
        }
        if let Some(context) = &self.context {
            args.push("--kube-context");
            args.push(context);
        }

        self.run_helm(&args).await?;
        info!(release = self.chart.release, "helm release installed");
        Ok(())
    }

    async fn wait_for_readiness(&self) -> Result<()> {
        let kubeconfig = k8s::read_kubeconfig(&self.kubeconfig.to_string_lossy())?;
        let client = k8s::client_for(kubeconfig, self.context.as_deref()).await?;

        match &self.workload {
            Workload::Deployment { namespace, name } => {
                k8s::wait_for_deployment(&client, namespace, name, self.timeout).await
            }
            Workload::DaemonSet { namespace, name } => {
                k8s::wait_for_daemonset(&client, namespace, name, self.timeout).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_default_cni() {
        assert_eq!(
            plan_installs(Cni::Default, Toggle::Enabled, Distribution::Kind),
            vec![InstallTarget::MetricsServer]
        );
        // K3d ships metrics-server by default.
        assert_eq!(
            plan_installs(Cni::Default, Toggle::Enabled, Distribution::K3d),
            vec![]
        );
        assert_eq!(
            plan_installs(Cni::Default, Toggle::Disabled, Distribution::Kind),
            vec![]
        );
    }

    #[test]
    fn test_plan_cilium_orders_cni_first() {
        assert_eq!(
            plan_installs(Cni::Cilium, Toggle::Enabled, Distribution::Kind),
            vec![InstallTarget::Cilium, InstallTarget::MetricsServer]
        );
        assert_eq!(
            plan_installs(Cni::Cilium, Toggle::Enabled, Distribution::K3d),
            vec![InstallTarget::Cilium]
        );
        assert_eq!(
            plan_installs(Cni::Cilium, Toggle::Disabled, Distribution::K3d),
            vec![InstallTarget::Cilium]
        );
    }
}
