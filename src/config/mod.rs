pub mod k3d;
pub mod kind;
mod loader;
mod types;
pub mod validator;

pub use loader::{expand_home, load_distribution_config, load_spec};
pub use types::{
    ClusterSpec, ClusterSpecFile, Cni, Connection, Distribution, LocalRegistryOptions,
    MirrorRegistry, Options, Toggle, SPEC_API_VERSION, SPEC_KIND,
};

use anyhow::Result;
use k3d::K3dConfig;
use kind::KindConfig;

/// In-memory distribution-native configuration.
///
/// Exclusively owned by the engine for the duration of an invocation;
/// mutated only by pre-create stages and never persisted back to disk.
#[derive(Debug, Clone)]
pub enum DistributionConfig {
    Kind(KindConfig),
    K3d(K3dConfig),
}

impl DistributionConfig {
    pub fn distribution(&self) -> Distribution {
        match self {
            DistributionConfig::Kind(_) => Distribution::Kind,
            DistributionConfig::K3d(_) => Distribution::K3d,
        }
    }

    /// Cluster name from the config, or the distribution default.
    pub fn resolved_name(&self) -> String {
        match self {
            DistributionConfig::Kind(cfg) => cfg.resolved_name(),
            DistributionConfig::K3d(cfg) => cfg.resolved_name(),
        }
    }

    /// True when the config carries any registry mirror entries.
    pub fn has_mirror_entries(&self) -> bool {
        match self {
            DistributionConfig::Kind(cfg) => cfg.has_mirror_entries(),
            DistributionConfig::K3d(cfg) => cfg.has_mirror_entries(),
        }
    }

    /// Route `host` through the registry container at `endpoint`.
    pub fn ensure_mirror(&mut self, host: &str, endpoint: &str) -> Result<()> {
        match self {
            DistributionConfig::Kind(cfg) => {
                cfg.ensure_mirror(host, endpoint);
                Ok(())
            }
            DistributionConfig::K3d(cfg) => cfg.ensure_mirror(host, endpoint),
        }
    }

    /// Render the config for handing to the distribution CLI.
    pub fn to_yaml(&self) -> Result<String> {
        let rendered = match self {
            DistributionConfig::Kind(cfg) => serde_yaml::to_string(cfg)?,
            DistributionConfig::K3d(cfg) => serde_yaml::to_string(cfg)?,
        };
        Ok(rendered)
    }
}
