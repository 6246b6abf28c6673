use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{ClusterSpecFile, Distribution};
use super::DistributionConfig;

/// Default search locations for the cluster spec.
const DEFAULT_SPEC_PATHS: [&str; 2] = ["./ksail.yaml", "./ksail.yml"];

/// Load the user-facing cluster spec.
///
/// An explicit path wins; otherwise the default locations are searched and
/// the error names them when nothing is found.
pub fn load_spec(path: Option<&str>) -> Result<(PathBuf, ClusterSpecFile)> {
    let path = find_spec_file(path)?;

    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read cluster spec: {}", path.display()))?;

    let spec: ClusterSpecFile = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse cluster spec: {}", path.display()))?;

    Ok((path, spec))
}

fn find_spec_file(path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = path {
        let expanded = expand_home(Path::new(path))?;
        if expanded.exists() {
            return Ok(expanded);
        }
        return Err(anyhow!("cluster spec not found: {}", path));
    }

    for candidate in DEFAULT_SPEC_PATHS {
        let candidate = PathBuf::from(candidate);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(anyhow!(
        "no cluster spec found (searched {})",
        DEFAULT_SPEC_PATHS.join(", ")
    ))
}

/// Load the distribution-native config for the given distribution.
pub fn load_distribution_config(
    distribution: Distribution,
    path: &str,
) -> Result<DistributionConfig> {
    let expanded = expand_home(Path::new(path))?;
    let content = fs::read_to_string(&expanded)
        .with_context(|| format!("failed to read distribution config: {}", path))?;

    let config = match distribution {
        Distribution::Kind => DistributionConfig::Kind(
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse Kind config: {}", path))?,
        ),
        Distribution::K3d => DistributionConfig::K3d(
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse K3d config: {}", path))?,
        ),
    };

    Ok(config)
}

/// Expand ~ to home directory
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    if let Some(stripped) = path_str.strip_prefix('~') {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
        let rest = stripped.strip_prefix('/').unwrap_or(stripped);
        Ok(home.join(rest))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_home(Path::new("~/.kube/config")).unwrap(),
            home.join(".kube/config")
        );
        assert_eq!(
            expand_home(Path::new("/etc/ksail.yaml")).unwrap(),
            PathBuf::from("/etc/ksail.yaml")
        );
    }

    #[test]
    fn test_load_spec_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "apiVersion: ksail.dev/v1alpha1\nkind: Cluster\nspec:\n  distribution: Kind\n  distributionConfigPath: kind.yaml\n"
        )
        .unwrap();

        let (path, spec) = load_spec(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(path, file.path());
        assert_eq!(spec.spec.distribution, Distribution::Kind);
    }

    #[test]
    fn test_load_spec_missing_path() {
        let err = load_spec(Some("/nonexistent/ksail.yaml")).unwrap_err();
        assert!(err.to_string().contains("cluster spec not found"));
    }

    #[test]
    fn test_load_distribution_config_kind() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "kind: Cluster\napiVersion: kind.x-k8s.io/v1alpha4\nname: dev\n"
        )
        .unwrap();

        let config =
            load_distribution_config(Distribution::Kind, file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.resolved_name(), "dev");
        assert_eq!(config.distribution(), Distribution::Kind);
    }

    #[test]
    fn test_load_distribution_config_missing() {
        let err =
            load_distribution_config(Distribution::K3d, "/nonexistent/k3d.yaml").unwrap_err();
        assert!(err
            .to_string()
            .contains("failed to read distribution config"));
    }
}
