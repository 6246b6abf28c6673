use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected metadata literal for a K3d cluster config.
pub const K3D_API_VERSION: &str = "k3d.io/v1alpha5";

/// The subset of the K3d simple-config schema this tool reads and mutates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K3dConfig {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "K3dOptions::is_empty")]
    pub options: K3dOptions,

    #[serde(default, skip_serializing_if = "K3dRegistries::is_empty")]
    pub registries: K3dRegistries,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K3dOptions {
    #[serde(default, skip_serializing_if = "K3sOptions::is_empty")]
    pub k3s: K3sOptions,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl K3dOptions {
    fn is_empty(&self) -> bool {
        self.k3s.is_empty() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K3sOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<K3sExtraArg>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl K3sOptions {
    fn is_empty(&self) -> bool {
        self.extra_args.is_empty() && self.extra.is_empty()
    }
}

/// One K3s server/agent argument with its node filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K3sExtraArg {
    pub arg: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_filters: Vec<String>,
}

/// K3d registries block; `config` is a YAML document embedded as a string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K3dRegistries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl K3dRegistries {
    fn is_empty(&self) -> bool {
        self.config.is_none() && self.extra.is_empty()
    }
}

/// Parsed form of the embedded `registries.config` document.
///
/// `BTreeMap` keeps host order stable across merge-and-rerender cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistriesConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    mirrors: BTreeMap<String, MirrorEntry>,

    #[serde(flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MirrorEntry {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    endpoint: Vec<String>,

    #[serde(flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

impl K3dConfig {
    /// Cluster name, falling back to the K3d default.
    pub fn resolved_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("k3s-default")
            .to_string()
    }

    /// Merge a mirror entry for `host` into the embedded registries config.
    ///
    /// The embedded document is parsed to a map, merged by host, and
    /// re-rendered in stable key order, so re-applying the same spec leaves
    /// the string unchanged.
    pub fn ensure_mirror(&mut self, host: &str, endpoint: &str) -> Result<()> {
        let mut parsed: RegistriesConfig = match self.registries.config.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_yaml::from_str(raw)
                .context("failed to parse embedded registries config")?,
            _ => RegistriesConfig::default(),
        };

        let entry = parsed.mirrors.entry(host.to_string()).or_default();
        if !entry.endpoint.iter().any(|e| e == endpoint) {
            entry.endpoint.push(endpoint.to_string());
        }

        self.registries.config = Some(
            serde_yaml::to_string(&parsed)
                .context("failed to render embedded registries config")?,
        );
        Ok(())
    }

    /// True when the embedded registries config declares any mirrors.
    pub fn has_mirror_entries(&self) -> bool {
        self.registries
            .config
            .as_deref()
            .and_then(|raw| serde_yaml::from_str::<RegistriesConfig>(raw).ok())
            .map(|cfg| !cfg.mirrors.is_empty())
            .unwrap_or(false)
    }

    /// Append an extra K3s server argument on `server:*` nodes if absent.
    pub fn ensure_server_arg(&mut self, arg: &str) {
        if self.has_server_arg(arg) {
            return;
        }
        self.options.k3s.extra_args.push(K3sExtraArg {
            arg: arg.to_string(),
            node_filters: vec!["server:*".to_string()],
        });
    }

    pub fn has_server_arg(&self, arg: &str) -> bool {
        self.options.k3s.extra_args.iter().any(|a| a.arg == arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_name() {
        let cfg: K3dConfig =
            serde_yaml::from_str("apiVersion: k3d.io/v1alpha5\nname: dev\n").unwrap();
        assert_eq!(cfg.resolved_name(), "dev");

        let cfg: K3dConfig = serde_yaml::from_str("apiVersion: k3d.io/v1alpha5\n").unwrap();
        assert_eq!(cfg.resolved_name(), "k3s-default");
    }

    #[test]
    fn test_ensure_mirror_merges_into_embedded_config() {
        let mut cfg = K3dConfig::default();
        cfg.ensure_mirror("docker.io", "http://k3d-docker-io:5000")
            .unwrap();
        cfg.ensure_mirror("ghcr.io", "http://k3d-ghcr-io:5000")
            .unwrap();

        let raw = cfg.registries.config.as_deref().unwrap();
        let parsed: RegistriesConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(
            parsed.mirrors["docker.io"].endpoint,
            vec!["http://k3d-docker-io:5000"]
        );
        assert_eq!(
            parsed.mirrors["ghcr.io"].endpoint,
            vec!["http://k3d-ghcr-io:5000"]
        );
        assert!(cfg.has_mirror_entries());
    }

    #[test]
    fn test_ensure_mirror_idempotent() {
        let mut cfg = K3dConfig::default();
        cfg.ensure_mirror("docker.io", "http://k3d-docker-io:5000")
            .unwrap();
        let once = cfg.registries.config.clone();
        cfg.ensure_mirror("docker.io", "http://k3d-docker-io:5000")
            .unwrap();
        assert_eq!(once, cfg.registries.config);
    }

    #[test]
    fn test_ensure_mirror_preserves_existing_entries() {
        let mut cfg = K3dConfig {
            registries: K3dRegistries {
                config: Some(
                    "mirrors:\n  quay.io:\n    endpoint:\n      - https://quay.mirror\n".into(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        cfg.ensure_mirror("docker.io", "http://k3d-docker-io:5000")
            .unwrap();

        let parsed: RegistriesConfig =
            serde_yaml::from_str(cfg.registries.config.as_deref().unwrap()).unwrap();
        assert_eq!(parsed.mirrors.len(), 2);
        assert_eq!(parsed.mirrors["quay.io"].endpoint, vec!["https://quay.mirror"]);
    }

    #[test]
    fn test_ensure_server_arg_idempotent() {
        let mut cfg = K3dConfig::default();
        cfg.ensure_server_arg("--disable=metrics-server");
        cfg.ensure_server_arg("--disable=metrics-server");
        assert_eq!(cfg.options.k3s.extra_args.len(), 1);
        assert_eq!(
            cfg.options.k3s.extra_args[0].node_filters,
            vec!["server:*"]
        );
    }

    #[test]
    fn test_extra_args_parse() {
        let yaml = r#"
apiVersion: k3d.io/v1alpha5
options:
  k3s:
    extraArgs:
      - arg: --flannel-backend=none
        nodeFilters:
          - server:*
      - arg: --disable-network-policy
        nodeFilters:
          - server:*
"#;
        let cfg: K3dConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.has_server_arg("--flannel-backend=none"));
        assert!(cfg.has_server_arg("--disable-network-policy"));
        assert!(!cfg.has_server_arg("--disable=metrics-server"));
    }
}
