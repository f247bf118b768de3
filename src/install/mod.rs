// ABOUTME: Install orchestration: pre-check, provision, form, install, bootstrap, pool, fixups.
// ABOUTME: Phases run strictly in sequence and nothing is rolled back on failure.

mod error;
mod fixups;
mod plan;
mod summary;

pub use error::{InstallError, InstallErrorKind, InstallFailure};
pub use fixups::{CONFLICTING_RULES, apply_network_fixups};
pub use plan::{BootstrapPlan, HostLayout};
pub use summary::Summary;

use crate::bootstrap::Bootstrapper;
use crate::certs::CertStore;
use crate::cluster::{Cluster, form_cluster};
use crate::components::{
    Component, ComponentError, ComponentsConfig, PlatformComponent, install_components,
};
use crate::diagnostics::{Diagnostics, Warning};
use crate::driver::{DriverOptions, MachineDriver, OPEN_PORT};
use crate::engine::EngineConnector;
use crate::environments::{EnvironmentRegistry, RegistryError};
use crate::machine::{Machine, ProvisionError, Provisioner, socket_addr};
use crate::types::{MachineName, TargetName};
use error::*;
use nonempty::NonEmpty;
use snafu::{IntoError, ResultExt};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything one install run needs, fixed before the run starts.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub name: TargetName,
    /// Directory holding certificates and the environment registry.
    pub store: PathBuf,
    pub layout: HostLayout,
    pub driver_options: DriverOptions,
    pub control_plane_port: u16,
    pub components: ComponentsConfig,
}

impl InstallOptions {
    fn validate(&self) -> Result<(), InstallError> {
        if self.layout.core_hosts == 0 {
            return InvalidOptionsSnafu {
                reason: "core_hosts must be at least 1",
            }
            .fail();
        }
        if self.control_plane_port == 0 {
            return InvalidOptionsSnafu {
                reason: "control plane port must not be 0",
            }
            .fail();
        }
        Ok(())
    }
}

/// The result of a successful install.
#[derive(Debug)]
pub struct Installation {
    pub cluster: Cluster,
    /// Core machines followed by any locally provisioned application machines.
    pub machines: Vec<Machine>,
    pub components: Vec<PlatformComponent>,
    pub control_plane_url: String,
    pub plan: BootstrapPlan,
    pub diagnostics: Diagnostics,
}

impl Installation {
    /// Query the cluster for the node and component tables.
    pub async fn summary(&self) -> Result<Summary, ComponentError> {
        let nodes = self.cluster.cluster_info().await?;
        let mut components = Vec::with_capacity(self.components.len());
        for component in &self.components {
            components.push(component.status(&self.cluster).await?);
        }
        Ok(Summary { nodes, components })
    }
}

/// Sequences one install run over its collaborators.
pub struct Installer {
    driver: Arc<dyn MachineDriver>,
    connector: Arc<dyn EngineConnector>,
    bootstrapper: Arc<dyn Bootstrapper>,
    environments: Arc<dyn EnvironmentRegistry>,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("driver", &self.driver.name())
            .finish_non_exhaustive()
    }
}

impl Installer {
    pub fn new(
        driver: Arc<dyn MachineDriver>,
        connector: Arc<dyn EngineConnector>,
        bootstrapper: Arc<dyn Bootstrapper>,
        environments: Arc<dyn EnvironmentRegistry>,
    ) -> Self {
        Self {
            driver,
            connector,
            bootstrapper,
            environments,
        }
    }

    /// Run every phase. On failure, the machines created so far are returned with the error.
    pub async fn install(&self, options: &InstallOptions) -> Result<Installation, InstallFailure> {
        let mut machines = Vec::new();
        match self.run(options, &mut machines).await {
            Ok(installation) => Ok(installation),
            Err(error) => {
                tracing::error!("install of {} failed: {}", options.name, error);
                Err(InstallFailure::new(error, machines))
            }
        }
    }

    async fn run(
        &self,
        options: &InstallOptions,
        machines: &mut Vec<Machine>,
    ) -> Result<Installation, InstallError> {
        let name = options.name.as_str();
        let mut diagnostics = Diagnostics::default();

        tracing::info!("pre-check for target {}", name);
        self.pre_check(options)?;

        let provisioner = Provisioner::new(
            Arc::clone(&self.driver),
            CertStore::new(&options.store, &options.name),
            options.name.clone(),
            options.driver_options.clone(),
        )
        .context(SetupSnafu)?;

        tracing::info!("provisioning {} core machines", options.layout.core_hosts);
        let core_overrides =
            DriverOptions::new().with(OPEN_PORT, options.control_plane_port.to_string());
        for index in 1..=options.layout.core_hosts {
            provision_tracked(&provisioner, &core_overrides, machines)
                .await
                .context(ProvisionCoreSnafu { index })?;
        }
        let core = machines.clone();

        tracing::info!("forming cluster of {} machines", core.len());
        let members = NonEmpty::from_vec(core.clone()).ok_or_else(|| {
            InvalidOptionsSnafu {
                reason: "no core machines were provisioned",
            }
            .build()
        })?;
        let cluster = form_cluster(members, options.layout.core_hosts, self.connector.as_ref())
            .await
            .context(FormClusterSnafu)?;

        let registry = provisioner
            .registry_certificate()
            .context(RegistryCertificateSnafu)?;
        let config = options
            .components
            .clone()
            .with_registry_ip(registry.map(|cert| cert.bound_ip()));

        tracing::info!("installing platform components");
        let components = PlatformComponent::ALL.to_vec();
        install_components(&cluster, &config, &components)
            .await
            .context(InstallComponentsSnafu)?;

        let url = format!(
            "http://{}",
            socket_addr(cluster.leader().public_ip(), options.control_plane_port)
        );
        let kind = self.driver.kind();
        let plan = BootstrapPlan::new(kind, options.layout, &core);
        tracing::info!(
            "bootstrapping control plane at {} (register {}, create {})",
            url,
            plan.nodes_to_register.len(),
            plan.nodes_to_create
        );
        self.bootstrapper
            .bootstrap(&url, &plan)
            .await
            .context(BootstrapSnafu { url: url.as_str() })?;

        let pool_size = BootstrapPlan::local_pool_size(kind, options.layout);
        if pool_size > 0 {
            tracing::info!("provisioning {} application machines", pool_size);
            let mut pool = Vec::with_capacity(pool_size);
            for index in 1..=pool_size {
                let ip = provision_tracked(&provisioner, &DriverOptions::new(), machines)
                    .await
                    .context(ProvisionPoolSnafu { index })?;
                pool.push(ip);
            }
            self.bootstrapper
                .register_nodes(&url, &pool)
                .await
                .context(RegisterPoolSnafu)?;
        }

        tracing::info!("applying network fixups");
        apply_network_fixups(&core, &mut diagnostics).await;

        if let Err(e) = self.environments.mark_ready(name, &url) {
            diagnostics.warn(Warning::environment_registry(format!(
                "could not mark {name} ready: {e}"
            )));
        }

        tracing::info!("install of {} complete", name);
        Ok(Installation {
            cluster,
            machines: std::mem::take(machines),
            components,
            control_plane_url: url,
            plan,
            diagnostics,
        })
    }

    fn pre_check(&self, options: &InstallOptions) -> Result<(), InstallError> {
        let name = options.name.as_str();
        if self.environments.contains(name).context(EnvironmentsSnafu)? {
            return TargetExistsSnafu { name }.fail();
        }
        options.validate()?;
        match self.environments.record(name) {
            Ok(_) => Ok(()),
            Err(RegistryError::AlreadyExists(name)) => TargetExistsSnafu { name }.fail(),
            Err(e) => Err(EnvironmentsSnafu.into_error(e)),
        }
    }
}

/// Provision one machine and append it to `machines`, returning its private IP.
///
/// A machine whose post-create steps failed is appended too, so the failure reports it.
async fn provision_tracked(
    provisioner: &Provisioner,
    overrides: &DriverOptions,
    machines: &mut Vec<Machine>,
) -> Result<IpAddr, ProvisionError> {
    match provisioner.provision(overrides).await {
        Ok(machine) => {
            let ip = machine.private_ip();
            machines.push(machine);
            Ok(ip)
        }
        Err(e) => {
            if let Some(machine) = e.created_machine() {
                machines.push(machine.clone());
            }
            Err(e)
        }
    }
}

/// Remove `machines` through `driver`, continuing past failures.
///
/// Returns the machines that could not be removed.
pub async fn teardown(driver: &dyn MachineDriver, machines: &[Machine]) -> Vec<MachineName> {
    let mut failed = Vec::new();
    for machine in machines {
        tracing::info!("removing machine {}", machine.name());
        if let Err(e) = driver.remove(machine.name()).await {
            tracing::warn!("failed to remove {}: {}", machine.name(), e);
            failed.push(machine.name().clone());
        }
    }
    failed
}
