// ABOUTME: The fixed set of platform services deployed onto a formed cluster.
// ABOUTME: Components install in a fixed order and stop at the first failure.

mod api;
mod cache;
mod database;
mod registry;
mod router;
mod settings;

pub use settings::{
    ApiSettings, CacheSettings, ComponentsConfig, DatabaseSettings, RegistrySettings,
    RouterSettings,
};

use crate::cluster::{Cluster, ClusterError};
use crate::engine::PublishedPort;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

pub type Result<T> = std::result::Result<T, ComponentError>;

#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("registry certificate is bound to {0}, which is not a machine of this cluster")]
    StaleRegistryCertificate(IpAddr),

    #[error("no registry certificate has been issued for this run")]
    MissingRegistryCertificate,

    #[error("preparing {path} on {machine} failed: {source}")]
    DataDir {
        machine: String,
        path: String,
        #[source]
        source: crate::ssh::Error,
    },

    #[error("creating the root user exited with {exit_code}: {output}")]
    RootUser { exit_code: i64, output: String },
}

/// A component failed to install; later components were skipped.
#[derive(Debug, thiserror::Error)]
#[error("installing component {component} failed: {source}")]
pub struct ComponentFailure {
    pub component: String,
    #[source]
    pub source: ComponentError,
}

/// One row of the component table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub name: String,
    pub published_ports: Vec<PublishedPort>,
    pub replicas: u64,
}

/// A platform service that can be deployed onto a cluster.
#[async_trait]
pub trait Component: Send + Sync {
    /// Service name on the swarm.
    fn name(&self) -> &str;

    async fn install(&self, cluster: &Cluster, config: &ComponentsConfig) -> Result<()>;

    async fn status(&self, cluster: &Cluster) -> Result<ComponentStatus> {
        let view = cluster.service_info(self.name()).await?;
        Ok(ComponentStatus {
            name: self.name().to_string(),
            published_ports: view.published_ports,
            replicas: view.replicas,
        })
    }
}

/// The closed set of platform services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformComponent {
    Database,
    Cache,
    Router,
    Registry,
    Api,
}

impl PlatformComponent {
    /// Install order; later entries reference earlier ones.
    pub const ALL: [PlatformComponent; 5] = [
        PlatformComponent::Database,
        PlatformComponent::Cache,
        PlatformComponent::Router,
        PlatformComponent::Registry,
        PlatformComponent::Api,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformComponent::Database => database::SERVICE,
            PlatformComponent::Cache => cache::SERVICE,
            PlatformComponent::Router => router::SERVICE,
            PlatformComponent::Registry => registry::SERVICE,
            PlatformComponent::Api => api::SERVICE,
        }
    }
}

impl fmt::Display for PlatformComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
impl Component for PlatformComponent {
    fn name(&self) -> &str {
        self.as_str()
    }

    async fn install(&self, cluster: &Cluster, config: &ComponentsConfig) -> Result<()> {
        match self {
            PlatformComponent::Database => database::install(cluster, config).await,
            PlatformComponent::Cache => cache::install(cluster, config).await,
            PlatformComponent::Router => router::install(cluster, config).await,
            PlatformComponent::Registry => registry::install(cluster, config).await,
            PlatformComponent::Api => api::install(cluster, config).await,
        }
    }
}

/// Install `components` in order, stopping at the first failure.
pub async fn install_components<C: Component>(
    cluster: &Cluster,
    config: &ComponentsConfig,
    components: &[C],
) -> std::result::Result<(), ComponentFailure> {
    for component in components {
        tracing::info!("installing component {}", component.name());
        component
            .install(cluster, config)
            .await
            .map_err(|source| ComponentFailure {
                component: component.name().to_string(),
                source,
            })?;
    }
    Ok(())
}

/// Router domain: the configured one, or a wildcard DNS name for the leader's public IP.
pub fn router_domain(cluster: &Cluster, config: &ComponentsConfig) -> String {
    config
        .router
        .domain
        .clone()
        .unwrap_or_else(|| format!("{}.nip.io", cluster.leader().public_ip()))
}
