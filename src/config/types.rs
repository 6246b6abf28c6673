use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Expected metadata literals for the user-facing spec document.
pub const SPEC_API_VERSION: &str = "ksail.dev/v1alpha1";
pub const SPEC_KIND: &str = "Cluster";

/// The user-facing cluster document (`apiVersion: ksail.dev/v1alpha1`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpecFile {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    pub spec: ClusterSpec,
}

/// Declarative cluster specification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Backend distribution realising the cluster.
    pub distribution: Distribution,

    /// Path to the distribution-native config file.
    #[serde(rename = "distributionConfigPath")]
    pub distribution_config_path: String,

    #[serde(default)]
    pub connection: Connection,

    #[serde(default)]
    pub cni: Cni,

    #[serde(default)]
    pub metrics_server: Toggle,

    #[serde(default)]
    pub local_registry: Toggle,

    #[serde(default)]
    pub mirror_registries: Vec<MirrorRegistry>,

    #[serde(default)]
    pub options: Options,
}

/// Supported local-Kubernetes backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Distribution {
    Kind,
    K3d,
}

impl Distribution {
    pub const ALL: [Distribution; 2] = [Distribution::Kind, Distribution::K3d];

    pub fn as_str(&self) -> &'static str {
        match self {
            Distribution::Kind => "Kind",
            Distribution::K3d => "K3d",
        }
    }

    /// Kubernetes context prefix (`kind-{name}` / `k3d-{name}`).
    pub fn context_prefix(&self) -> &'static str {
        match self {
            Distribution::Kind => "kind",
            Distribution::K3d => "k3d",
        }
    }

    /// Cluster name used when neither side of the config provides one.
    pub fn default_cluster_name(&self) -> &'static str {
        match self {
            Distribution::Kind => "kind",
            Distribution::K3d => "k3s-default",
        }
    }

    /// Container network the distribution attaches its nodes to.
    pub fn network_name(&self, cluster_name: &str) -> String {
        match self {
            Distribution::Kind => "kind".to_string(),
            Distribution::K3d => format!("k3d-{}", cluster_name),
        }
    }

    /// CLI binary that provisions this distribution.
    pub fn binary(&self) -> &'static str {
        match self {
            Distribution::Kind => "kind",
            Distribution::K3d => "k3d",
        }
    }

    /// Conventional distribution config path used by `list --all`.
    pub fn default_config_path(&self) -> &'static str {
        match self {
            Distribution::Kind => "kind.yaml",
            Distribution::K3d => "k3d.yaml",
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Kind" | "kind" => Ok(Distribution::Kind),
            "K3d" | "k3d" => Ok(Distribution::K3d),
            other => Err(format!(
                "unsupported distribution '{}' (expected Kind or K3d)",
                other
            )),
        }
    }
}

impl TryFrom<String> for Distribution {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// CNI selection: the distribution's default network or Cilium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Cni {
    #[default]
    Default,
    Cilium,
}

/// Enabled/Disabled feature flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Toggle {
    Enabled,
    #[default]
    Disabled,
}

impl Toggle {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Toggle::Enabled)
    }
}

/// Cluster connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Kubernetes context name; must match `{kind|k3d}-{clusterName}`.
    #[serde(default)]
    pub context: Option<String>,

    /// Kubeconfig path, `~` expansion supported.
    #[serde(default = "default_kubeconfig")]
    pub kubeconfig: String,

    /// Readiness timeout, e.g. `5m`.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            context: None,
            kubeconfig: default_kubeconfig(),
            timeout: default_timeout(),
        }
    }
}

fn default_kubeconfig() -> String {
    "~/.kube/config".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

/// A pull-through-cache registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MirrorRegistry {
    /// Registry host being mirrored, e.g. `docker.io`.
    pub host: String,

    /// Upstream URL the cache proxies to.
    #[serde(rename = "upstreamURL")]
    pub upstream_url: String,
}

/// Feature-specific options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default)]
    pub local_registry: LocalRegistryOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRegistryOptions {
    /// Host port for the local registry; 0 means the default (5000).
    #[serde(default)]
    pub host_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_spec() {
        let yaml = r#"
apiVersion: ksail.dev/v1alpha1
kind: Cluster
spec:
  distribution: Kind
  distributionConfigPath: kind.yaml
  connection:
    context: kind-dev
    kubeconfig: ~/.kube/config
    timeout: 5m
  cni: Cilium
  metricsServer: Enabled
  localRegistry: Enabled
  mirrorRegistries:
    - host: docker.io
      upstreamURL: https://registry-1.docker.io
  options:
    localRegistry:
      hostPort: 5555
"#;
        let file: ClusterSpecFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.api_version, SPEC_API_VERSION);
        assert_eq!(file.kind, SPEC_KIND);
        let spec = &file.spec;
        assert_eq!(spec.distribution, Distribution::Kind);
        assert_eq!(spec.connection.context.as_deref(), Some("kind-dev"));
        assert_eq!(spec.connection.timeout, Duration::from_secs(300));
        assert_eq!(spec.cni, Cni::Cilium);
        assert!(spec.metrics_server.is_enabled());
        assert!(spec.local_registry.is_enabled());
        assert_eq!(spec.mirror_registries.len(), 1);
        assert_eq!(spec.mirror_registries[0].host, "docker.io");
        assert_eq!(spec.options.local_registry.host_port, 5555);
    }

    #[test]
    fn test_parse_minimal_spec_defaults() {
        let yaml = r#"
apiVersion: ksail.dev/v1alpha1
kind: Cluster
spec:
  distribution: K3d
  distributionConfigPath: k3d.yaml
"#;
        let file: ClusterSpecFile = serde_yaml::from_str(yaml).unwrap();
        let spec = &file.spec;
        assert_eq!(spec.distribution, Distribution::K3d);
        assert_eq!(spec.cni, Cni::Default);
        assert!(!spec.metrics_server.is_enabled());
        assert!(!spec.local_registry.is_enabled());
        assert!(spec.mirror_registries.is_empty());
        assert_eq!(spec.connection.kubeconfig, "~/.kube/config");
        assert_eq!(spec.connection.timeout, Duration::from_secs(300));
        assert_eq!(spec.options.local_registry.host_port, 0);
    }

    #[test]
    fn test_unknown_distribution_rejected() {
        let yaml = r#"
spec:
  distribution: EKS
  distributionConfigPath: eks.yaml
"#;
        let err = serde_yaml::from_str::<ClusterSpecFile>(yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported distribution 'EKS'"));
    }

    #[test]
    fn test_network_names() {
        assert_eq!(Distribution::Kind.network_name("dev"), "kind");
        assert_eq!(Distribution::K3d.network_name("dev"), "k3d-dev");
    }

    #[test]
    fn test_default_cluster_names() {
        assert_eq!(Distribution::Kind.default_cluster_name(), "kind");
        assert_eq!(Distribution::K3d.default_cluster_name(), "k3s-default");
    }
}
