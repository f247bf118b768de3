// ABOUTME: Narrow container-engine traits for swarm, network, service and exec operations.
// ABOUTME: The bollard implementation talks to each machine's engine over mutual TLS.

mod bollard;
mod error;

pub use self::bollard::{BollardEngine, TlsConnector};
pub use error::EngineError;

use crate::machine::Machine;
use crate::types::{ContainerId, ImageRef, NetworkId, NodeId, ServiceId, TaskId};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Swarm port managers accept joins on.
pub const SWARM_PORT: u16 = 2377;

/// Join tokens captured from the initializing manager.
#[derive(Clone, PartialEq, Eq)]
pub struct JoinTokens {
    pub worker: String,
    pub manager: String,
}

impl fmt::Debug for JoinTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JoinTokens(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        })
    }
}

/// A container port published on every node through the ingress mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishedPort {
    pub target: u16,
    pub published: u16,
    pub protocol: Protocol,
}

impl PublishedPort {
    pub fn tcp(target: u16, published: u16) -> Self {
        Self {
            target,
            published,
            protocol: Protocol::Tcp,
        }
    }
}

impl fmt::Display for PublishedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.published, self.target, self.protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Overlay network to create on the swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub subnet: String,
    pub attachable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayNetwork {
    pub id: NetworkId,
    pub name: String,
}

/// A replicated service to submit to a manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    pub image: ImageRef,
    pub command: Option<Vec<String>>,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<PublishedPort>,
    pub mounts: Vec<BindMount>,
    pub networks: Vec<NetworkId>,
    pub constraints: Vec<String>,
    pub replicas: u64,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, image: ImageRef) -> Self {
        Self {
            name: name.into(),
            image,
            command: None,
            env: BTreeMap::new(),
            ports: Vec::new(),
            mounts: Vec::new(),
            networks: Vec::new(),
            constraints: Vec::new(),
            replicas: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub id: NodeId,
    pub hostname: String,
    pub addr: Option<String>,
    pub ready: bool,
    pub manager: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceView {
    pub id: ServiceId,
    pub name: String,
    pub replicas: u64,
    pub published_ports: Vec<PublishedPort>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskView {
    pub id: TaskId,
    pub node_id: Option<NodeId>,
    pub container_id: Option<ContainerId>,
    pub running: bool,
}

/// A command to run inside a container, optionally fed through stdin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

impl ExecRequest {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Exit status and combined stdout/stderr of an exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub output: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Swarm membership operations.
#[async_trait]
pub trait SwarmOps: Send + Sync {
    /// Initialize a new swarm on this engine, returning this node's id.
    async fn init_swarm(&self, advertise: IpAddr) -> Result<NodeId>;

    async fn join_tokens(&self) -> Result<JoinTokens>;

    /// Join the swarm managed at `manager_addr` (`ip:2377`).
    async fn join_swarm(&self, advertise: IpAddr, manager_addr: &str, token: &str) -> Result<()>;

    /// Swarm node id of this engine.
    async fn node_id(&self) -> Result<NodeId>;

    async fn promote(&self, node: &NodeId) -> Result<()>;

    async fn list_nodes(&self) -> Result<Vec<NodeView>>;
}

/// Network operations.
#[async_trait]
pub trait NetworkOps: Send + Sync {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<OverlayNetwork>;
}

/// Service and task operations.
#[async_trait]
pub trait ServiceOps: Send + Sync {
    /// Submit a service. A duplicate name yields [`EngineError::Conflict`].
    async fn create_service(&self, spec: &ServiceSpec) -> Result<ServiceId>;

    async fn inspect_service(&self, name: &str) -> Result<ServiceView>;

    async fn list_tasks(&self, service: &str) -> Result<Vec<TaskView>>;
}

/// Exec operations inside containers local to this engine.
#[async_trait]
pub trait ExecOps: Send + Sync {
    async fn exec(&self, container: &ContainerId, request: &ExecRequest) -> Result<ExecOutput>;
}

/// Everything the cluster needs from one engine.
pub trait Engine: SwarmOps + NetworkOps + ServiceOps + ExecOps {}

impl<T: SwarmOps + NetworkOps + ServiceOps + ExecOps> Engine for T {}

/// Opens an engine connection to a machine.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self, machine: &Machine) -> Result<Arc<dyn Engine>>;
}
