//! Stage timing and the stage catalogue
//!
//! Every lifecycle intent is a sequence of stages. A stage is described by an
//! immutable [`StageSpec`] (title, emoji, activity, success and failure texts)
//! and executed by the engine's shared runner, which owns the [`Timer`] and
//! emits the Title/Activity/Success triplet around the stage action.

use std::time::{Duration, Instant};

/// Monotonic duration accounting for the whole invocation and for the
/// current stage.
#[derive(Debug, Default)]
pub struct Timer {
    started: Option<Instant>,
    stage_started: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the invocation clock. Also resets the stage clock.
    pub fn start(&mut self) {
        let now = Instant::now();
        self.started = Some(now);
        self.stage_started = Some(now);
    }

    /// Reset the stage clock; the total clock keeps running.
    pub fn new_stage(&mut self) {
        self.stage_started = Some(Instant::now());
    }

    /// `(total since start, since current stage)`. Zero before `start`.
    pub fn timing(&self) -> (Duration, Duration) {
        let total = self.started.map(|t| t.elapsed()).unwrap_or_default();
        let stage = self.stage_started.map(|t| t.elapsed()).unwrap_or_default();
        (total, stage)
    }
}

/// Immutable description of one pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub title: &'static str,
    pub emoji: &'static str,
    pub activity: &'static str,
    pub success: &'static str,
    pub failure_prefix: &'static str,
}

pub const CREATE_MIRROR_REGISTRIES: StageSpec = StageSpec {
    title: "Create mirror registries...",
    emoji: "📦",
    activity: "provisioning pull-through cache registries",
    success: "Mirror registries ready",
    failure_prefix: "failed to create mirror registries",
};

pub const CREATE_LOCAL_REGISTRY: StageSpec = StageSpec {
    title: "Create local registry...",
    emoji: "📦",
    activity: "provisioning local OCI registry",
    success: "Local registry ready",
    failure_prefix: "failed to create local registry",
};

pub const CREATE_CLUSTER: StageSpec = StageSpec {
    title: "Create cluster...",
    emoji: "🚀",
    activity: "creating cluster",
    success: "Cluster created",
    failure_prefix: "failed to create cluster",
};

pub const CONNECT_REGISTRIES: StageSpec = StageSpec {
    title: "Connect registries...",
    emoji: "🔗",
    activity: "connecting registries to the cluster network",
    success: "Registries connected",
    failure_prefix: "failed to connect registries",
};

pub const INSTALL_CILIUM: StageSpec = StageSpec {
    title: "Install Cilium CNI...",
    emoji: "🔌",
    activity: "installing Cilium and waiting for readiness",
    success: "Cilium CNI ready",
    failure_prefix: "failed to install Cilium CNI",
};

pub const INSTALL_METRICS_SERVER: StageSpec = StageSpec {
    title: "Install Metrics Server...",
    emoji: "📈",
    activity: "installing metrics-server and waiting for readiness",
    success: "Metrics Server ready",
    failure_prefix: "failed to install Metrics Server",
};

pub const DELETE_CLUSTER: StageSpec = StageSpec {
    title: "Delete cluster...",
    emoji: "🗑️",
    activity: "deleting cluster",
    success: "Cluster deleted",
    failure_prefix: "failed to delete cluster",
};

pub const CLEANUP_REGISTRIES: StageSpec = StageSpec {
    title: "Clean up registries...",
    emoji: "🧹",
    activity: "removing registry containers",
    success: "Registries cleaned up",
    failure_prefix: "failed to clean up registries",
};

pub const START_CLUSTER: StageSpec = StageSpec {
    title: "Start cluster...",
    emoji: "▶️",
    activity: "starting cluster",
    success: "Cluster started",
    failure_prefix: "failed to start cluster",
};

pub const STOP_CLUSTER: StageSpec = StageSpec {
    title: "Stop cluster...",
    emoji: "⏹️",
    activity: "stopping cluster",
    success: "Cluster stopped",
    failure_prefix: "failed to stop cluster",
};

pub const CLUSTER_STATUS: StageSpec = StageSpec {
    title: "Check cluster status...",
    emoji: "📡",
    activity: "probing the Kubernetes API",
    success: "Status check complete",
    failure_prefix: "failed to check cluster status",
};

pub const LIST_CLUSTERS: StageSpec = StageSpec {
    title: "List clusters...",
    emoji: "📋",
    activity: "listing clusters",
    success: "Clusters listed",
    failure_prefix: "failed to list clusters",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_stage_reset() {
        let mut timer = Timer::new();
        timer.start();
        std::thread::sleep(Duration::from_millis(20));
        timer.new_stage();
        std::thread::sleep(Duration::from_millis(5));
        let (total, stage) = timer.timing();
        assert!(total >= Duration::from_millis(25));
        assert!(stage >= Duration::from_millis(5));
        assert!(stage < total);
    }

    #[test]
    fn test_timer_unstarted_is_zero() {
        let timer = Timer::new();
        let (total, stage) = timer.timing();
        assert_eq!(total, Duration::ZERO);
        assert_eq!(stage, Duration::ZERO);
    }

    #[test]
    fn test_timer_restart_resets_total() {
        let mut timer = Timer::new();
        timer.start();
        std::thread::sleep(Duration::from_millis(20));
        timer.start();
        let (total, _) = timer.timing();
        assert!(total < Duration::from_millis(20));
    }
}
