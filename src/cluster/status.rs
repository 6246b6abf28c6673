//! Cluster status types

/// Observed status of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    /// The Kubernetes API answered the probe.
    Running,
    /// The cluster exists but its API is unreachable.
    Stopped,
    /// No cluster with the resolved name exists.
    NotFound,
    /// Existence could not be determined.
    Unknown,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Running => "Running",
            ClusterStatus::Stopped => "Stopped",
            ClusterStatus::NotFound => "Not Found",
            ClusterStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
