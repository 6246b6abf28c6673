//! Semantic and cross-config validation
//!
//! Runs after the user spec and the distribution config are loaded and before
//! any stage executes. Pure: same input, same output, no I/O.

use std::collections::HashSet;

use super::k3d::K3D_API_VERSION;
use super::kind::{KIND_API_VERSION, KIND_KIND};
use super::types::{ClusterSpecFile, Cni, Distribution, SPEC_API_VERSION, SPEC_KIND};
use super::DistributionConfig;

const FLANNEL_BACKEND_NONE: &str = "--flannel-backend=none";
const DISABLE_NETWORK_POLICY: &str = "--disable-network-policy";

/// A single validation failure with enough context to fix it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{field}: {message} (current: '{current}', expected: {expected}); fix: {fix}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub current: String,
    pub expected: String,
    pub fix: String,
}

/// Validate the loaded spec against the loaded distribution config.
///
/// Fatal iff the returned list is non-empty.
pub fn validate(spec: &ClusterSpecFile, config: &DistributionConfig) -> Vec<ValidationError> {
    SpecValidator::new(spec, config).validate()
}

struct SpecValidator<'a> {
    spec: &'a ClusterSpecFile,
    config: &'a DistributionConfig,
    errors: Vec<ValidationError>,
}

impl<'a> SpecValidator<'a> {
    fn new(spec: &'a ClusterSpecFile, config: &'a DistributionConfig) -> Self {
        Self {
            spec,
            config,
            errors: Vec::new(),
        }
    }

    fn validate(mut self) -> Vec<ValidationError> {
        self.check_spec_metadata();
        self.check_distribution_metadata();
        self.check_cni_alignment();
        self.check_context_name();
        self.check_mirror_registries();
        self.errors
    }

    fn add(
        &mut self,
        field: &str,
        message: impl Into<String>,
        current: impl Into<String>,
        expected: impl Into<String>,
        fix: impl Into<String>,
    ) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.into(),
            current: current.into(),
            expected: expected.into(),
            fix: fix.into(),
        });
    }

    fn check_spec_metadata(&mut self) {
        if self.spec.api_version.trim() != SPEC_API_VERSION {
            self.add(
                "apiVersion",
                "unexpected apiVersion",
                self.spec.api_version.trim(),
                SPEC_API_VERSION,
                format!("set apiVersion: {}", SPEC_API_VERSION),
            );
        }
        if self.spec.kind.trim() != SPEC_KIND {
            self.add(
                "kind",
                "unexpected kind",
                self.spec.kind.trim(),
                SPEC_KIND,
                format!("set kind: {}", SPEC_KIND),
            );
        }
    }

    fn check_distribution_metadata(&mut self) {
        match self.config {
            DistributionConfig::Kind(cfg) => {
                if cfg.kind.trim() != KIND_KIND {
                    self.add(
                        "kind",
                        "unexpected kind in Kind config",
                        cfg.kind.trim(),
                        KIND_KIND,
                        format!("set kind: {} in the Kind config", KIND_KIND),
                    );
                }
                if cfg.api_version.trim() != KIND_API_VERSION {
                    self.add(
                        "apiVersion",
                        "unexpected apiVersion in Kind config",
                        cfg.api_version.trim(),
                        KIND_API_VERSION,
                        format!("set apiVersion: {} in the Kind config", KIND_API_VERSION),
                    );
                }
            }
            DistributionConfig::K3d(cfg) => {
                if cfg.api_version.trim() != K3D_API_VERSION {
                    self.add(
                        "apiVersion",
                        "unexpected apiVersion in K3d config",
                        cfg.api_version.trim(),
                        K3D_API_VERSION,
                        format!("set apiVersion: {} in the K3d config", K3D_API_VERSION),
                    );
                }
            }
        }
    }

    /// A custom CNI requires the distribution's default CNI to be disabled,
    /// and the default CNI requires it not to be.
    fn check_cni_alignment(&mut self) {
        match (self.spec.spec.cni, self.config) {
            (Cni::Cilium, DistributionConfig::Kind(cfg)) => {
                if !cfg.networking.disable_default_cni {
                    self.add(
                        "spec.cni",
                        "Cilium requires the default CNI to be disabled",
                        "disableDefaultCNI: false",
                        "disableDefaultCNI: true",
                        "set networking.disableDefaultCNI: true in the Kind config",
                    );
                }
            }
            (Cni::Cilium, DistributionConfig::K3d(cfg)) => {
                let missing: Vec<&str> = [FLANNEL_BACKEND_NONE, DISABLE_NETWORK_POLICY]
                    .into_iter()
                    .filter(|arg| !cfg.has_server_arg(arg))
                    .collect();
                if !missing.is_empty() {
                    self.add(
                        "spec.cni",
                        "Cilium requires Flannel and network policy to be disabled",
                        format!("missing extraArgs: {}", missing.join(", ")),
                        format!(
                            "extraArgs containing {} and {}",
                            FLANNEL_BACKEND_NONE, DISABLE_NETWORK_POLICY
                        ),
                        "add both arguments under options.k3s.extraArgs with nodeFilters [server:*]",
                    );
                }
            }
            (Cni::Default, DistributionConfig::Kind(cfg)) => {
                if cfg.networking.disable_default_cni {
                    self.add(
                        "spec.cni",
                        "the default CNI is disabled in the Kind config",
                        "disableDefaultCNI: true",
                        "disableDefaultCNI: false",
                        "remove networking.disableDefaultCNI or set spec.cni: Cilium",
                    );
                }
            }
            (Cni::Default, DistributionConfig::K3d(cfg)) => {
                if cfg.has_server_arg(FLANNEL_BACKEND_NONE) {
                    self.add(
                        "spec.cni",
                        "Flannel is disabled in the K3d config",
                        FLANNEL_BACKEND_NONE,
                        "no CNI-disabling extraArgs",
                        "remove the argument from options.k3s.extraArgs or set spec.cni: Cilium",
                    );
                }
            }
        }
    }

    /// `connection.context`, when set, must match `{kind|k3d}-{clusterName}`.
    fn check_context_name(&mut self) {
        let context = match self
            .spec
            .spec
            .connection
            .context
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            Some(context) => context,
            None => return,
        };

        let expected = format!(
            "{}-{}",
            self.distribution().context_prefix(),
            self.config.resolved_name()
        );
        if context != expected {
            self.add(
                "spec.connection.context",
                "context does not match the cluster name",
                context,
                expected.clone(),
                format!("set spec.connection.context: {} or leave it unset", expected),
            );
        }
    }

    /// Mirror hosts must be unique and non-empty with a non-empty upstream.
    fn check_mirror_registries(&mut self) {
        let mut seen: HashSet<String> = HashSet::new();
        let mirrors = self.spec.spec.mirror_registries.clone();
        for (i, mirror) in mirrors.iter().enumerate() {
            let field = format!("spec.mirrorRegistries[{}]", i);
            let host = mirror.host.trim();
            let upstream = mirror.upstream_url.trim();

            if host.is_empty() {
                self.add(
                    &format!("{}.host", field),
                    "mirror host must not be empty",
                    &mirror.host,
                    "a registry host such as docker.io",
                    "set the host field or remove the entry",
                );
                continue;
            }
            if upstream.is_empty() {
                self.add(
                    &format!("{}.upstreamURL", field),
                    "mirror upstream URL must not be empty",
                    &mirror.upstream_url,
                    "an upstream URL such as https://registry-1.docker.io",
                    "set the upstreamURL field or remove the entry",
                );
            }
            if !seen.insert(host.to_string()) {
                self.add(
                    &format!("{}.host", field),
                    "duplicate mirror host",
                    host,
                    "each host at most once",
                    "remove the duplicate entry",
                );
            }
        }
    }

    fn distribution(&self) -> Distribution {
        self.config.distribution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ClusterSpec, Connection, MirrorRegistry, Options, Toggle};
    use crate::config::{k3d::K3dConfig, kind::KindConfig};

    fn spec_file(spec: ClusterSpec) -> ClusterSpecFile {
        ClusterSpecFile {
            api_version: SPEC_API_VERSION.to_string(),
            kind: SPEC_KIND.to_string(),
            spec,
        }
    }

    fn kind_spec() -> ClusterSpec {
        ClusterSpec {
            distribution: Distribution::Kind,
            distribution_config_path: "kind.yaml".to_string(),
            connection: Connection::default(),
            cni: Cni::Default,
            metrics_server: Toggle::Enabled,
            local_registry: Toggle::Disabled,
            mirror_registries: Vec::new(),
            options: Options::default(),
        }
    }

    fn kind_config(name: Option<&str>, disable_cni: bool) -> DistributionConfig {
        let mut cfg = KindConfig {
            kind: KIND_KIND.to_string(),
            api_version: KIND_API_VERSION.to_string(),
            name: name.map(String::from),
            ..Default::default()
        };
        cfg.networking.disable_default_cni = disable_cni;
        DistributionConfig::Kind(cfg)
    }

    fn k3d_config(name: Option<&str>) -> DistributionConfig {
        DistributionConfig::K3d(K3dConfig {
            api_version: K3D_API_VERSION.to_string(),
            name: name.map(String::from),
            ..Default::default()
        })
    }

    #[test]
    fn test_valid_spec_passes() {
        let spec = spec_file(kind_spec());
        let config = kind_config(Some("dev"), false);
        assert!(validate(&spec, &config).is_empty());
    }

    #[test]
    fn test_metadata_mismatch() {
        let mut spec = spec_file(kind_spec());
        spec.api_version = "ksail.dev/v1beta1".to_string();
        let errors = validate(&spec, &kind_config(None, false));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "apiVersion");
        assert_eq!(errors[0].expected, SPEC_API_VERSION);
    }

    #[test]
    fn test_cilium_requires_disabled_default_cni_on_kind() {
        let mut spec = kind_spec();
        spec.cni = Cni::Cilium;
        let errors = validate(&spec_file(spec), &kind_config(Some("dev"), false));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.cni");
        assert!(errors[0].fix.contains("networking.disableDefaultCNI: true"));
    }

    #[test]
    fn test_cilium_alignment_satisfied_on_kind() {
        let mut spec = kind_spec();
        spec.cni = Cni::Cilium;
        assert!(validate(&spec_file(spec), &kind_config(Some("dev"), true)).is_empty());
    }

    #[test]
    fn test_default_cni_rejects_disabled_default_on_kind() {
        let errors = validate(&spec_file(kind_spec()), &kind_config(None, true));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.cni");
    }

    #[test]
    fn test_cilium_requires_both_args_on_k3d() {
        let mut spec = kind_spec();
        spec.distribution = Distribution::K3d;
        spec.cni = Cni::Cilium;

        let mut cfg = K3dConfig {
            api_version: K3D_API_VERSION.to_string(),
            ..Default::default()
        };
        cfg.ensure_server_arg(FLANNEL_BACKEND_NONE);
        let errors = validate(&spec_file(spec), &DistributionConfig::K3d(cfg));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].current.contains(DISABLE_NETWORK_POLICY));
    }

    #[test]
    fn test_context_must_match_cluster_name() {
        let mut spec = kind_spec();
        spec.connection.context = Some("kind-other".to_string());
        let errors = validate(&spec_file(spec), &kind_config(Some("dev"), false));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.connection.context");
        assert_eq!(errors[0].expected, "kind-dev");
    }

    #[test]
    fn test_context_matches_default_name() {
        let mut spec = kind_spec();
        spec.distribution = Distribution::K3d;
        spec.connection.context = Some("k3d-k3s-default".to_string());
        assert!(validate(&spec_file(spec), &k3d_config(None)).is_empty());
    }

    #[test]
    fn test_whitespace_context_ignored() {
        let mut spec = kind_spec();
        spec.connection.context = Some("   ".to_string());
        assert!(validate(&spec_file(spec), &kind_config(None, false)).is_empty());
    }

    #[test]
    fn test_duplicate_mirror_hosts_rejected() {
        let mut spec = kind_spec();
        spec.mirror_registries = vec![
            MirrorRegistry {
                host: "docker.io".to_string(),
                upstream_url: "https://registry-1.docker.io".to_string(),
            },
            MirrorRegistry {
                host: "docker.io".to_string(),
                upstream_url: "https://mirror.example.com".to_string(),
            },
        ];
        let errors = validate(&spec_file(spec), &kind_config(None, false));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate"));
    }

    #[test]
    fn test_empty_mirror_upstream_rejected() {
        let mut spec = kind_spec();
        spec.mirror_registries = vec![MirrorRegistry {
            host: "ghcr.io".to_string(),
            upstream_url: "   ".to_string(),
        }];
        let errors = validate(&spec_file(spec), &kind_config(None, false));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "spec.mirrorRegistries[0].upstreamURL");
    }
}
