use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected metadata literals for a Kind cluster config.
pub const KIND_API_VERSION: &str = "kind.x-k8s.io/v1alpha4";
pub const KIND_KIND: &str = "Cluster";

/// The subset of the Kind native schema this tool reads and mutates.
///
/// Unknown fields are carried through untouched so a user's config survives
/// the round trip to the `kind` CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindConfig {
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "KindNetworking::is_empty")]
    pub networking: KindNetworking,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containerd_config_patches: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindNetworking {
    #[serde(default, rename = "disableDefaultCNI")]
    pub disable_default_cni: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl KindNetworking {
    fn is_empty(&self) -> bool {
        !self.disable_default_cni && self.extra.is_empty()
    }
}

impl KindConfig {
    /// Cluster name, falling back to the Kind default.
    pub fn resolved_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("kind")
            .to_string()
    }

    /// Ensure a containerd mirror patch routing `host` to `endpoint`.
    ///
    /// A patch already mentioning the host leaves the config untouched, so
    /// re-applying the same spec is a no-op.
    pub fn ensure_mirror(&mut self, host: &str, endpoint: &str) {
        let marker = format!("registry.mirrors.\"{}\"", host);
        if self
            .containerd_config_patches
            .iter()
            .any(|p| p.contains(&marker))
        {
            return;
        }
        self.containerd_config_patches.push(format!(
            "[plugins.\"io.containerd.grpc.v1.cri\".registry.mirrors.\"{}\"]\n  endpoint = [\"{}\"]",
            host, endpoint
        ));
    }

    /// True when any containerd patch declares a registry mirror.
    pub fn has_mirror_entries(&self) -> bool {
        self.containerd_config_patches
            .iter()
            .any(|p| p.contains("registry.mirrors."))
    }
}
