// ABOUTME: A formed swarm cluster: members, overlay network, join tokens and engine handles.
// ABOUTME: Provides service creation, in-task exec and read-only status projections.

mod error;
mod former;
mod state;

pub use error::{ClusterError, FormationStep, Result};
pub use former::{Formation, OVERLAY_NETWORK, OVERLAY_SUBNET, form_cluster};
pub use state::{Initialized, NetworkReady, Unformed};

use crate::engine::{
    Engine, ExecOutput, ExecRequest, JoinTokens, OverlayNetwork, ServiceSpec, ServiceView,
};
use crate::machine::Machine;
use crate::types::{MachineName, ServiceId};
use nonempty::NonEmpty;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TASK_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A machine together with its engine connection.
#[derive(Clone)]
pub struct Member {
    pub machine: Machine,
    pub engine: Arc<dyn Engine>,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

/// One row of the node table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub hostname: String,
    pub ip: String,
    pub state: String,
    pub manager: bool,
}

/// A formed swarm. The first `manager_count` members are managers; all members are workers.
pub struct Cluster {
    members: NonEmpty<Member>,
    manager_count: usize,
    network: OverlayNetwork,
    tokens: JoinTokens,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("members", &self.members)
            .field("manager_count", &self.manager_count)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl Cluster {
    pub(crate) fn new(
        members: NonEmpty<Member>,
        manager_count: usize,
        network: OverlayNetwork,
        tokens: JoinTokens,
    ) -> Self {
        let manager_count = manager_count.clamp(1, members.len());
        Self {
            members,
            manager_count,
            network,
            tokens,
        }
    }

    /// All members in formation order; never empty.
    pub fn workers(&self) -> impl Iterator<Item = &Machine> {
        self.members.iter().map(|m| &m.machine)
    }

    /// The manager prefix of [`Cluster::workers`].
    pub fn managers(&self) -> impl Iterator<Item = &Machine> {
        self.workers().take(self.manager_count)
    }

    pub fn worker_count(&self) -> usize {
        self.members.len()
    }

    pub fn manager_count(&self) -> usize {
        self.manager_count
    }

    /// The machine the swarm was initialized on; always a manager.
    pub fn leader(&self) -> &Machine {
        &self.members.first().machine
    }

    pub fn network(&self) -> &OverlayNetwork {
        &self.network
    }

    pub fn join_tokens(&self) -> &JoinTokens {
        &self.tokens
    }

    fn manager_engine(&self) -> &dyn Engine {
        self.members.first().engine.as_ref()
    }

    pub fn machine_with_private_ip(&self, ip: IpAddr) -> Option<&Machine> {
        self.workers().find(|m| m.private_ip() == ip)
    }

    fn member_by_hostname(&self, hostname: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.machine.hostname() == hostname)
    }

    pub fn member(&self, name: &MachineName) -> Option<&Member> {
        self.members.iter().find(|m| m.machine.name() == name)
    }

    /// Submit `spec` to a manager, attached to the overlay network.
    pub async fn create_service(&self, mut spec: ServiceSpec) -> Result<ServiceId> {
        if !spec.networks.contains(&self.network.id) {
            spec.networks.push(self.network.id.clone());
        }
        tracing::debug!("creating service {} from {}", spec.name, spec.image);
        Ok(self.manager_engine().create_service(&spec).await?)
    }

    /// Run a command inside the first running task of `service`.
    ///
    /// The exec goes through the engine of the machine hosting the task.
    pub async fn service_exec(&self, service: &str, request: &ExecRequest) -> Result<ExecOutput> {
        let engine = self.manager_engine();
        let task = engine
            .list_tasks(service)
            .await?
            .into_iter()
            .find(|t| t.running)
            .ok_or_else(|| ClusterError::NoRunningTask(service.to_string()))?;

        let container = task.container_id.ok_or_else(|| ClusterError::NoContainer {
            service: service.to_string(),
        })?;
        let node_id = task.node_id.ok_or_else(|| ClusterError::UnknownNode {
            service: service.to_string(),
            node: "<unassigned>".to_string(),
        })?;

        let nodes = engine.list_nodes().await?;
        let hostname = nodes
            .iter()
            .find(|n| n.id == node_id)
            .map(|n| n.hostname.as_str())
            .ok_or_else(|| ClusterError::UnknownNode {
                service: service.to_string(),
                node: node_id.to_string(),
            })?;
        let member = self
            .member_by_hostname(hostname)
            .ok_or_else(|| ClusterError::UnknownNode {
                service: service.to_string(),
                node: hostname.to_string(),
            })?;

        tracing::debug!(
            "exec {:?} in {} on {}",
            request.cmd,
            service,
            member.machine.name()
        );
        Ok(member.engine.exec(&container, request).await?)
    }

    /// Poll until `service` has a running task.
    pub async fn wait_for_running_task(&self, service: &str, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            let tasks = self.manager_engine().list_tasks(service).await?;
            if tasks.iter().any(|t| t.running) {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(ClusterError::Timeout {
                    service: service.to_string(),
                    waited: timeout,
                });
            }
            tokio::time::sleep(TASK_POLL_INTERVAL.min(timeout)).await;
        }
    }

    pub async fn service_info(&self, name: &str) -> Result<ServiceView> {
        Ok(self.manager_engine().inspect_service(name).await?)
    }

    /// Node table: hostname, address, readiness and manager flag per swarm node.
    pub async fn cluster_info(&self) -> Result<Vec<NodeInfo>> {
        let nodes = self.manager_engine().list_nodes().await?;
        Ok(nodes
            .into_iter()
            .map(|node| {
                let ip = self
                    .member_by_hostname(&node.hostname)
                    .map(|m| m.machine.public_ip().to_string())
                    .or(node.addr)
                    .unwrap_or_default();
                NodeInfo {
                    hostname: node.hostname,
                    ip,
                    state: if node.ready { "ready" } else { "down" }.to_string(),
                    manager: node.manager,
                }
            })
            .collect())
    }
}
