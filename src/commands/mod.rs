//! CLI argument types and flag parsing shared by main and the engine.

use clap::{Args, Subcommand, ValueEnum};

use crate::config::{MirrorRegistry, Toggle};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the cluster with its registries and installs
    Create(CreateArgs),
    /// Delete the cluster and clean up its registries
    Delete(DeleteArgs),
    /// Start a stopped cluster
    Start,
    /// Stop a running cluster
    Stop,
    /// Report whether the cluster is running, stopped or absent
    Status,
    /// List clusters
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Delete an existing cluster with the same name first
    #[arg(long)]
    pub force: bool,

    /// Additional mirror registry as host=upstreamURL (repeatable)
    #[arg(long = "mirror-registry", value_name = "HOST=URL")]
    pub mirror_registry: Vec<String>,

    /// Override the spec's metrics-server setting
    #[arg(long, value_enum)]
    pub metrics_server: Option<ToggleArg>,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Also remove the registry volumes
    #[arg(long)]
    pub delete_registry_volumes: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// List clusters across all supported distributions
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToggleArg {
    Enabled,
    Disabled,
}

impl From<ToggleArg> for Toggle {
    fn from(value: ToggleArg) -> Self {
        match value {
            ToggleArg::Enabled => Toggle::Enabled,
            ToggleArg::Disabled => Toggle::Disabled,
        }
    }
}

/// Parse one `host=upstreamURL` mirror spec.
///
/// The host is everything before the first `=` and must not be empty; the
/// upstream is the remainder and may itself contain `=`. Whitespace is
/// trimmed on both sides. Invalid specs yield `None`.
pub fn parse_mirror_spec(value: &str) -> Option<MirrorRegistry> {
    let (host, upstream) = value.trim().split_once('=')?;
    let host = host.trim();
    let upstream = upstream.trim();
    if host.is_empty() || upstream.is_empty() {
        return None;
    }
    Some(MirrorRegistry {
        host: host.to_string(),
        upstream_url: upstream.to_string(),
    })
}

/// Render a mirror back to its flag form.
pub fn render_mirror_spec(mirror: &MirrorRegistry) -> String {
    format!("{}={}", mirror.host, mirror.upstream_url)
}

/// Parse repeated `--mirror-registry` values: invalid specs are silently
/// dropped, input order is preserved, later duplicate hosts are discarded.
pub fn parse_mirror_flags(values: &[String]) -> Vec<MirrorRegistry> {
    let mut mirrors: Vec<MirrorRegistry> = Vec::new();
    for value in values {
        if let Some(mirror) = parse_mirror_spec(value) {
            if !mirrors.iter().any(|m| m.host == mirror.host) {
                mirrors.push(mirror);
            }
        }
    }
    mirrors
}

/// Merge flag mirrors over the spec's: a flag entry replaces a same-host
/// spec entry, anything else is appended in flag order.
pub fn merge_mirrors(
    spec: Vec<MirrorRegistry>,
    flags: Vec<MirrorRegistry>,
) -> Vec<MirrorRegistry> {
    let mut merged = spec;
    for flag in flags {
        match merged.iter_mut().find(|m| m.host == flag.host) {
            Some(existing) => *existing = flag,
            None => merged.push(flag),
        }
    }
    merged
}
