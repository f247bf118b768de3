// ABOUTME: Typestate cluster formation: init swarm, create overlay network, join and promote.
// ABOUTME: Each method consumes self and returns the next state on success.

use super::error::{ClusterError, FormationStep, Result};
use super::state::{Initialized, NetworkReady, Unformed};
use super::{Cluster, Member};
use crate::engine::{EngineConnector, NetworkSpec, SWARM_PORT};
use crate::machine::{Machine, socket_addr};
use nonempty::NonEmpty;

pub const OVERLAY_NETWORK: &str = "flotilla";
pub const OVERLAY_SUBNET: &str = "10.10.0.0/16";

/// A cluster in the making. `S` records how far formation got.
pub struct Formation<S> {
    members: NonEmpty<Member>,
    desired_managers: usize,
    state: S,
}

impl<S> Formation<S> {
    fn transition<T>(self, state: T) -> Formation<T> {
        Formation {
            members: self.members,
            desired_managers: self.desired_managers,
            state,
        }
    }

    fn leader(&self) -> &Member {
        self.members.first()
    }

    /// Number of managers formation will end with.
    pub fn manager_count(&self) -> usize {
        self.desired_managers.clamp(1, self.members.len())
    }
}

impl Formation<Unformed> {
    /// Start formation over already connected members.
    pub fn new(members: NonEmpty<Member>, desired_managers: usize) -> Self {
        Self {
            members,
            desired_managers,
            state: Unformed,
        }
    }

    /// Open an engine connection to every machine.
    pub async fn connect(
        machines: NonEmpty<Machine>,
        desired_managers: usize,
        connector: &dyn EngineConnector,
    ) -> Result<Self> {
        let NonEmpty { head, tail } = machines;
        let mut members = NonEmpty::new(connect_member(head, connector).await?);
        for machine in tail {
            members.push(connect_member(machine, connector).await?);
        }
        Ok(Self::new(members, desired_managers))
    }

    /// Initialize the swarm on the first machine, advertising its private IP.
    pub async fn init(self) -> Result<Formation<Initialized>> {
        let leader = self.leader();
        let name = leader.machine.name();
        tracing::info!("initializing swarm on {}", name);

        leader
            .engine
            .init_swarm(leader.machine.private_ip())
            .await
            .map_err(ClusterError::formation(name, FormationStep::Init))?;
        let tokens = leader
            .engine
            .join_tokens()
            .await
            .map_err(ClusterError::formation(name, FormationStep::Init))?;

        Ok(self.transition(Initialized { tokens }))
    }
}

impl Formation<Initialized> {
    /// Create the attachable overlay network on the initializing machine.
    pub async fn create_network(self) -> Result<Formation<NetworkReady>> {
        let leader = self.leader();
        let spec = NetworkSpec {
            name: OVERLAY_NETWORK.to_string(),
            subnet: OVERLAY_SUBNET.to_string(),
            attachable: true,
        };
        tracing::info!("creating overlay network {} ({})", spec.name, spec.subnet);

        let network = leader
            .engine
            .create_network(&spec)
            .await
            .map_err(ClusterError::formation(
                leader.machine.name(),
                FormationStep::Network,
            ))?;

        let tokens = self.state.tokens.clone();
        Ok(self.transition(NetworkReady { tokens, network }))
    }
}

impl Formation<NetworkReady> {
    /// Join every other machine as a worker, then promote up to the desired manager count.
    pub async fn join(self) -> Result<Cluster> {
        let leader = self.leader();
        let manager_addr = socket_addr(leader.machine.private_ip(), SWARM_PORT);
        let manager_count = self.manager_count();

        for member in self.members.tail.iter() {
            tracing::info!("joining {} to swarm at {}", member.machine.name(), manager_addr);
            member
                .engine
                .join_swarm(
                    member.machine.private_ip(),
                    &manager_addr,
                    &self.state.tokens.worker,
                )
                .await
                .map_err(ClusterError::formation(
                    member.machine.name(),
                    FormationStep::Join,
                ))?;
        }

        for member in self.members.iter().take(manager_count).skip(1) {
            tracing::info!("promoting {} to manager", member.machine.name());
            let node = member
                .engine
                .node_id()
                .await
                .map_err(ClusterError::formation(
                    member.machine.name(),
                    FormationStep::Promote,
                ))?;
            leader
                .engine
                .promote(&node)
                .await
                .map_err(ClusterError::formation(
                    member.machine.name(),
                    FormationStep::Promote,
                ))?;
        }

        let NetworkReady { tokens, network } = self.state;
        Ok(Cluster::new(self.members, manager_count, network, tokens))
    }
}

/// Connect, init, create the network and join, in that order.
pub async fn form_cluster(
    machines: NonEmpty<Machine>,
    desired_managers: usize,
    connector: &dyn EngineConnector,
) -> Result<Cluster> {
    Formation::<Unformed>::connect(machines, desired_managers, connector)
        .await?
        .init()
        .await?
        .create_network()
        .await?
        .join()
        .await
}

async fn connect_member(machine: Machine, connector: &dyn EngineConnector) -> Result<Member> {
    let engine = connector
        .connect(&machine)
        .await
        .map_err(ClusterError::formation(machine.name(), FormationStep::Connect))?;
    Ok(Member { machine, engine })
}
