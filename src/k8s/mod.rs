mod client;

pub use client::{
    client_for, probe_api, read_kubeconfig, resolve_kubeconfig_path, wait_for_daemonset,
    wait_for_deployment, STATUS_PROBE_TIMEOUT,
};
