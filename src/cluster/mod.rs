//! Cluster lifecycle engine
//!
//! Drives a cluster through create/delete/start/stop/status/list as a serial
//! pipeline of stages. Each stage bumps the timer, emits a Title/Activity
//! pair, runs its action under the invocation's cancellation token and either
//! emits a timed Success or wraps the failure with the stage's prefix.

pub mod docker;
pub mod installer;
pub mod k3d;
pub mod kind;
pub mod provisioner;
pub mod registry;
pub mod stage;
pub mod status;

pub use status::ClusterStatus;

use anyhow::{anyhow, bail, Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{
    self, validator, ClusterSpecFile, Distribution, DistributionConfig,
};
use crate::k8s;
use crate::notify::{Message, Notify};
use docker::EngineFactory;
use installer::{InstallTarget, InstallerFactory};
use provisioner::Provisioner;
use registry::RegistryDescriptor;
use stage::{StageSpec, Timer};

/// Resolves a distribution adapter for the loaded config.
pub type ProvisionerResolver =
    Arc<dyn Fn(&DistributionConfig, EngineFactory) -> Result<Box<dyn Provisioner>> + Send + Sync>;

/// Top-level pipeline over one validated cluster spec.
pub struct LifecycleEngine {
    spec: ClusterSpecFile,
    config: DistributionConfig,
    notifier: Arc<dyn Notify>,
    factory: EngineFactory,
    installer_factory: InstallerFactory,
    resolver: ProvisionerResolver,
    cancel: CancellationToken,
    multi_stage: bool,
}

impl LifecycleEngine {
    /// Build an engine over a loaded spec and distribution config.
    ///
    /// Validation runs here; every violation is emitted as an Error message
    /// before the constructor fails.
    pub fn new(
        spec: ClusterSpecFile,
        config: DistributionConfig,
        notifier: Arc<dyn Notify>,
    ) -> Result<Self> {
        let errors = validator::validate(&spec, &config);
        if !errors.is_empty() {
            for error in &errors {
                notifier.notify(Message::error(error.to_string()));
            }
            bail!("invalid configuration ({} error(s))", errors.len());
        }

        let connection = &spec.spec.connection;
        let installer_factory = installer::helm_installer_factory(
            connection.kubeconfig.clone(),
            connection.context.clone(),
            connection.timeout,
        );

        Ok(Self {
            spec,
            config,
            notifier,
            factory: docker::docker_engine_factory(),
            installer_factory,
            resolver: Arc::new(provisioner::resolve),
            cancel: CancellationToken::new(),
            multi_stage: false,
        })
    }

    pub fn with_engine_factory(mut self, factory: EngineFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_installer_factory(mut self, factory: InstallerFactory) -> Self {
        self.installer_factory = factory;
        self
    }

    pub fn with_provisioner_resolver(mut self, resolver: ProvisionerResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn distribution(&self) -> Distribution {
        self.config.distribution()
    }

    fn cluster_name(&self) -> String {
        self.config.resolved_name()
    }

    fn provisioner(&self) -> Result<Box<dyn Provisioner>> {
        (self.resolver)(&self.config, Arc::clone(&self.factory))
    }

    /// Shared stage runner: timer bump, Title/Activity, action under the
    /// cancellation token, timed Success or prefixed failure.
    async fn run_stage<T>(
        &self,
        timer: &mut Timer,
        spec: &StageSpec,
        action: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        timer.new_stage();
        self.notifier
            .notify(Message::title(spec.title).with_emoji(spec.emoji));
        self.notifier.notify(Message::activity(spec.activity));

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(anyhow!("operation cancelled")),
            result = action => result,
        };

        match result {
            Ok(value) => {
                let (total, stage) = timer.timing();
                self.notifier.notify(
                    Message::success(spec.success)
                        .with_timing(total, stage)
                        .multi_stage(self.multi_stage),
                );
                Ok(value)
            }
            Err(e) => Err(e.context(spec.failure_prefix)),
        }
    }

    /// Mirror descriptors for every mirror the spec declares.
    fn mirror_descriptors(&self) -> Vec<RegistryDescriptor> {
        let distribution = self.distribution();
        self.spec
            .spec
            .mirror_registries
            .iter()
            .map(|m| registry::mirror_descriptor(distribution, m))
            .collect()
    }

    fn local_descriptor(&self) -> Option<RegistryDescriptor> {
        self.spec.spec.local_registry.is_enabled().then(|| {
            registry::local_descriptor(self.spec.spec.options.local_registry.host_port)
        })
    }

    /// Pre-create config mutations: mirror routing, local-registry routing
    /// and the metrics-server toggle for K3d. All idempotent.
    fn apply_pre_create_mutations(&mut self) -> Result<()> {
        let distribution = self.distribution();
        let mirrors = self.spec.spec.mirror_registries.clone();
        for mirror in &mirrors {
            let name = registry::mirror_name(distribution, &mirror.host);
            let endpoint = format!("http://{}:{}", name, registry::REGISTRY_PORT);
            self.config
                .ensure_mirror(mirror.host.trim(), &endpoint)
                .context("failed to prepare distribution config")?;
        }

        if self.spec.spec.local_registry.is_enabled() {
            let endpoint = format!(
                "http://{}:{}",
                registry::LOCAL_REGISTRY_NAME,
                registry::REGISTRY_PORT
            );
            self.config
                .ensure_mirror(registry::LOCAL_REGISTRY_HOST, &endpoint)
                .context("failed to prepare distribution config")?;
        }

        if !self.spec.spec.metrics_server.is_enabled() {
            // Kind ships without metrics-server; only K3s needs disarming.
            if let DistributionConfig::K3d(cfg) = &mut self.config {
                cfg.ensure_server_arg("--disable=metrics-server");
            }
        }

        Ok(())
    }

    /// The create intent: registries before the cluster, connections and
    /// installers after it.
    pub async fn create(&mut self, force: bool) -> Result<()> {
        self.multi_stage = true;
        let mut timer = Timer::new();
        timer.start();

        self.apply_pre_create_mutations()?;

        let name = self.cluster_name();
        let provisioner = self.provisioner()?;

        if provisioner
            .exists(&name)
            .await
            .context("failed to check for an existing cluster")?
        {
            if !force {
                bail!("cluster already exists (use --force to recreate)");
            }
            self.delete_with(provisioner.as_ref(), &mut timer, false)
                .await?;
            // Stage timing restarts with the create phase proper.
            timer.start();
        }

        let mirrors = self.mirror_descriptors();
        let run_mirrors = !mirrors.is_empty() && self.config.has_mirror_entries();
        if run_mirrors {
            self.run_stage(&mut timer, &stage::CREATE_MIRROR_REGISTRIES, async {
                let engine = (self.factory)()?;
                engine.ping().await?;
                for descriptor in &mirrors {
                    registry::ensure_registry(engine.as_ref(), descriptor).await?;
                }
                Ok(())
            })
            .await?;
        }

        let local = self.local_descriptor();
        if let Some(descriptor) = &local {
            self.run_stage(&mut timer, &stage::CREATE_LOCAL_REGISTRY, async {
                let engine = (self.factory)()?;
                registry::ensure_registry(engine.as_ref(), descriptor).await
            })
            .await?;
        }

        self.run_stage(&mut timer, &stage::CREATE_CLUSTER, provisioner.create(&name))
            .await?;

        if run_mirrors || local.is_some() {
            let network = self.distribution().network_name(&name);
            self.run_stage(&mut timer, &stage::CONNECT_REGISTRIES, async {
                let engine = (self.factory)()?;
                for descriptor in &mirrors {
                    registry::connect_registry(engine.as_ref(), &network, descriptor).await?;
                }
                if let Some(descriptor) = &local {
                    registry::connect_registry(engine.as_ref(), &network, descriptor).await?;
                }
                Ok(())
            })
            .await?;
        }

        let plan = installer::plan_installs(
            self.spec.spec.cni,
            self.spec.spec.metrics_server,
            self.distribution(),
        );
        for target in plan {
            let installer = (self.installer_factory)(target)?;
            let stage_spec = match target {
                InstallTarget::Cilium => &stage::INSTALL_CILIUM,
                InstallTarget::MetricsServer => &stage::INSTALL_METRICS_SERVER,
            };
            self.run_stage(&mut timer, stage_spec, async {
                installer.install().await?;
                installer.wait_for_readiness().await
            })
            .await?;
        }

        Ok(())
    }

    /// The delete intent: adapter delete, then best-effort registry cleanup.
    pub async fn delete(&mut self, delete_registry_volumes: bool) -> Result<()> {
        self.multi_stage = true;
        let mut timer = Timer::new();
        timer.start();

        let provisioner = self.provisioner()?;
        self.delete_with(provisioner.as_ref(), &mut timer, delete_registry_volumes)
            .await
    }

    async fn delete_with(
        &self,
        provisioner: &dyn Provisioner,
        timer: &mut Timer,
        remove_volumes: bool,
    ) -> Result<()> {
        let name = self.cluster_name();
        self.run_stage(timer, &stage::DELETE_CLUSTER, async {
            if !provisioner
                .exists(&name)
                .await
                .context("failed to check for an existing cluster")?
            {
                self.notifier
                    .notify(Message::activity(format!("cluster {} is already absent", name)));
                return Ok(());
            }
            provisioner.delete(&name).await
        })
        .await?;

        let mut descriptors = self.mirror_descriptors();
        if let Some(local) = self.local_descriptor() {
            descriptors.push(local);
        }
        if descriptors.is_empty() {
            return Ok(());
        }

        // Cleanup never fails the delete; everything surfaces as Warnings.
        self.run_stage(timer, &stage::CLEANUP_REGISTRIES, async {
            match (self.factory)() {
                Ok(engine) => {
                    let failures =
                        registry::cleanup_registries(engine.as_ref(), &descriptors, remove_volumes)
                            .await;
                    for failure in failures {
                        self.notifier
                            .notify(Message::warning(format!("registry cleanup: {:#}", failure)));
                    }
                }
                Err(e) => {
                    self.notifier
                        .notify(Message::warning(format!("registry cleanup skipped: {:#}", e)));
                }
            }
            Ok(())
        })
        .await
    }

    pub async fn start(&mut self) -> Result<()> {
        self.multi_stage = false;
        let mut timer = Timer::new();
        timer.start();

        let name = self.cluster_name();
        let provisioner = self.provisioner()?;
        self.run_stage(&mut timer, &stage::START_CLUSTER, provisioner.start(&name))
            .await
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.multi_stage = false;
        let mut timer = Timer::new();
        timer.start();

        let name = self.cluster_name();
        let provisioner = self.provisioner()?;
        self.run_stage(&mut timer, &stage::STOP_CLUSTER, provisioner.stop(&name))
            .await
    }

    /// The status intent: API probe first, existence check second.
    pub async fn status(&mut self) -> Result<ClusterStatus> {
        self.multi_stage = false;
        let mut timer = Timer::new();
        timer.start();

        let spec = &stage::CLUSTER_STATUS;
        self.notifier
            .notify(Message::title(spec.title).with_emoji(spec.emoji));
        self.notifier.notify(Message::activity(spec.activity));

        let name = self.cluster_name();
        let provisioner = self.provisioner()?;

        let reachable = match k8s::read_kubeconfig(&self.spec.spec.connection.kubeconfig) {
            Ok(kubeconfig) => {
                match k8s::client_for(kubeconfig, self.spec.spec.connection.context.as_deref())
                    .await
                {
                    Ok(client) => k8s::probe_api(&client, k8s::STATUS_PROBE_TIMEOUT).await,
                    Err(e) => {
                        debug!(error = %e, "could not build API client");
                        false
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "could not read kubeconfig");
                false
            }
        };

        let status = if reachable {
            ClusterStatus::Running
        } else {
            match provisioner.exists(&name).await {
                Ok(true) => ClusterStatus::Stopped,
                Ok(false) => ClusterStatus::NotFound,
                Err(e) => {
                    debug!(error = %e, "existence check failed");
                    ClusterStatus::Unknown
                }
            }
        };

        let (total, stage_elapsed) = timer.timing();
        self.notifier.notify(
            Message::success(format!(
                "Cluster status: {} ({} on {})",
                status,
                name,
                self.distribution()
            ))
            .with_timing(total, stage_elapsed),
        );

        Ok(status)
    }

    /// The list intent. With `all`, every supported distribution is listed
    /// under its conventional default config; a distribution whose tooling
    /// or config is unavailable is skipped with a Warning.
    pub async fn list(&mut self, all: bool) -> Result<Vec<(Distribution, Vec<String>)>> {
        self.multi_stage = false;
        let mut timer = Timer::new();
        timer.start();

        let selected = self.distribution();
        let mut results: Vec<(Distribution, Vec<String>)> = Vec::new();

        self.run_stage(&mut timer, &stage::LIST_CLUSTERS, async {
            let provisioner = self.provisioner()?;
            results.push((selected, provisioner.list().await?));

            if all {
                for distribution in Distribution::ALL {
                    if distribution == selected {
                        continue;
                    }
                    match self.list_other(distribution).await {
                        Ok(names) => results.push((distribution, names)),
                        Err(e) => self.notifier.notify(Message::warning(format!(
                            "skipping {}: {:#}",
                            distribution, e
                        ))),
                    }
                }
            }
            Ok(())
        })
        .await?;

        if results.iter().all(|(_, names)| names.is_empty()) {
            self.notifier
                .notify(Message::activity("no clusters found"));
        }

        Ok(results)
    }

    async fn list_other(&self, distribution: Distribution) -> Result<Vec<String>> {
        let config = match config::load_distribution_config(
            distribution,
            distribution.default_config_path(),
        ) {
            Ok(config) => config,
            // Listing does not need the config contents; fall back to an
            // empty one when the conventional file is absent.
            Err(_) => match distribution {
                Distribution::Kind => {
                    DistributionConfig::Kind(crate::config::kind::KindConfig::default())
                }
                Distribution::K3d => {
                    DistributionConfig::K3d(crate::config::k3d::K3dConfig::default())
                }
            },
        };
        let provisioner = (self.resolver)(&config, Arc::clone(&self.factory))?;
        provisioner.list().await
    }
}
