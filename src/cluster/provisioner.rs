//! Distribution adapters
//!
//! Each supported distribution implements [`Provisioner`]: cluster CRUD,
//! listing and existence checks against its native CLI. The engine resolves
//! the adapter from the loaded distribution config (tagged-variant dispatch)
//! and hands it the mutated in-memory config at create time.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::io::Write;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use crate::cluster::docker::EngineFactory;
use crate::cluster::k3d::K3dProvisioner;
use crate::cluster::kind::KindProvisioner;
use crate::config::DistributionConfig;

/// Per-distribution cluster operations.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision the cluster from the in-memory distribution config.
    async fn create(&self, name: &str) -> Result<()>;

    /// Remove the cluster. Deleting a nonexistent cluster is a no-op.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Start a stopped cluster. Fails if the cluster does not exist.
    async fn start(&self, name: &str) -> Result<()>;

    /// Stop a running cluster. Fails if the cluster does not exist.
    async fn stop(&self, name: &str) -> Result<()>;

    /// Names of all clusters of this distribution.
    async fn list(&self) -> Result<Vec<String>>;

    async fn exists(&self, name: &str) -> Result<bool>;
}

/// Resolve the adapter for the loaded distribution config.
///
/// Verifies the distribution CLI is on PATH before the first use.
pub fn resolve(
    config: &DistributionConfig,
    factory: EngineFactory,
) -> Result<Box<dyn Provisioner>> {
    let binary = config.distribution().binary();
    which::which(binary)
        .with_context(|| format!("{} CLI not found on PATH", binary))
        .context("failed to create provisioner")?;

    Ok(match config {
        DistributionConfig::Kind(cfg) => Box::new(KindProvisioner::new(cfg.clone(), factory)),
        DistributionConfig::K3d(cfg) => Box::new(K3dProvisioner::new(cfg.clone())),
    })
}

/// Execute a distribution CLI, returning stdout on success or bailing with
/// the trimmed stderr.
pub(crate) async fn run_cli(program: &str, args: &[&str]) -> Result<String> {
    debug!(program, ?args, "running distribution CLI");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("running {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{} {} failed: {}",
            program,
            args.first().unwrap_or(&""),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Write the rendered distribution config to a temp file for `--config`.
///
/// The file lives as long as the returned handle; keep it alive across the
/// CLI invocation.
pub(crate) fn write_config_file(yaml: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new().context("creating temporary config file")?;
    file.write_all(yaml.as_bytes())
        .context("writing temporary config file")?;
    file.flush().context("flushing temporary config file")?;
    Ok(file)
}
