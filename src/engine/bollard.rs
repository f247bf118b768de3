// ABOUTME: Bollard-based engine implementation over mutual TLS.
// ABOUTME: Covers swarm init/join/promote, overlay networks, services, tasks and exec.

use super::{
    BindMount, Engine, EngineConnector, EngineError, ExecOps, ExecOutput, ExecRequest,
    JoinTokens, NetworkOps, NetworkSpec, NodeView, OverlayNetwork, Protocol, PublishedPort,
    Result, ServiceOps, ServiceSpec, ServiceView, SwarmOps, TaskView,
};
use crate::certs::ClientCertificate;
use crate::machine::Machine;
use crate::types::{ContainerId, NetworkId, NodeId, ServiceId, TaskId};
use async_trait::async_trait;
use bollard::Docker;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{
    EndpointPortConfig, EndpointPortConfigProtocolEnum, EndpointPortConfigPublishModeEnum,
    EndpointSpec, Ipam, IpamConfig, Mount, MountTypeEnum, NetworkAttachmentConfig,
    NetworkCreateRequest, NodeSpec, NodeSpecRoleEnum, NodeState, ServiceSpecMode,
    ServiceSpecModeReplicated, SwarmInitRequest, SwarmJoinRequest, TaskSpec,
    TaskSpecContainerSpec, TaskSpecPlacement, TaskState,
};
use bollard::query_parameters::{
    InspectServiceOptions, ListNodesOptions, ListTasksOptions, UpdateNodeOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const CONNECT_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_api_error(e: bollard::errors::Error) -> EngineError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => EngineError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => EngineError::Conflict(message.clone()),
        _ => EngineError::Api(e.to_string()),
    }
}

fn map_swarm_error(e: bollard::errors::Error) -> EngineError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 503 => EngineError::NotInSwarm(message.clone()),
        _ => map_api_error(e),
    }
}

fn map_exec_error(e: bollard::errors::Error) -> EngineError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => EngineError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => EngineError::Exec(format!("container not running: {message}")),
        _ => EngineError::Exec(e.to_string()),
    }
}

// =============================================================================
// Model Conversions
// =============================================================================

fn port_config(port: &PublishedPort) -> EndpointPortConfig {
    EndpointPortConfig {
        protocol: Some(match port.protocol {
            Protocol::Tcp => EndpointPortConfigProtocolEnum::TCP,
            Protocol::Udp => EndpointPortConfigProtocolEnum::UDP,
        }),
        target_port: Some(i64::from(port.target)),
        published_port: Some(i64::from(port.published)),
        publish_mode: Some(EndpointPortConfigPublishModeEnum::INGRESS),
        ..Default::default()
    }
}

fn published_port(config: &EndpointPortConfig) -> Option<PublishedPort> {
    let target = u16::try_from(config.target_port?).ok()?;
    let published = u16::try_from(config.published_port?).ok()?;
    let protocol = match config.protocol {
        Some(EndpointPortConfigProtocolEnum::UDP) => Protocol::Udp,
        _ => Protocol::Tcp,
    };
    Some(PublishedPort {
        target,
        published,
        protocol,
    })
}

fn bind_mount(mount: &BindMount) -> Mount {
    Mount {
        source: Some(mount.source.clone()),
        target: Some(mount.target.clone()),
        typ: Some(MountTypeEnum::BIND),
        read_only: Some(mount.read_only),
        ..Default::default()
    }
}

fn service_spec(spec: &ServiceSpec) -> bollard::models::ServiceSpec {
    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
    let mounts: Vec<Mount> = spec.mounts.iter().map(bind_mount).collect();

    let container_spec = TaskSpecContainerSpec {
        image: Some(spec.image.to_string()),
        args: spec.command.clone(),
        env: if env.is_empty() { None } else { Some(env) },
        mounts: if mounts.is_empty() { None } else { Some(mounts) },
        ..Default::default()
    };

    let networks: Vec<NetworkAttachmentConfig> = spec
        .networks
        .iter()
        .map(|n| NetworkAttachmentConfig {
            target: Some(n.to_string()),
            ..Default::default()
        })
        .collect();

    let task_template = TaskSpec {
        container_spec: Some(container_spec),
        placement: if spec.constraints.is_empty() {
            None
        } else {
            Some(TaskSpecPlacement {
                constraints: Some(spec.constraints.clone()),
                ..Default::default()
            })
        },
        networks: if networks.is_empty() {
            None
        } else {
            Some(networks)
        },
        ..Default::default()
    };

    bollard::models::ServiceSpec {
        name: Some(spec.name.clone()),
        task_template: Some(task_template),
        mode: Some(ServiceSpecMode {
            replicated: Some(ServiceSpecModeReplicated {
                replicas: Some(spec.replicas as i64),
            }),
            ..Default::default()
        }),
        endpoint_spec: if spec.ports.is_empty() {
            None
        } else {
            Some(EndpointSpec {
                ports: Some(spec.ports.iter().map(port_config).collect()),
                ..Default::default()
            })
        },
        ..Default::default()
    }
}

// =============================================================================
// BollardEngine
// =============================================================================

/// One engine connection, bound to a single machine.
pub struct BollardEngine {
    client: Docker,
}

impl BollardEngine {
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Connect to `tcp://host:2376` presenting the run's client certificate.
    pub fn connect_tls(endpoint: &str, client: &ClientCertificate) -> Result<Self> {
        let docker = Docker::connect_with_ssl(
            endpoint,
            &client.key,
            &client.cert,
            &client.ca,
            CONNECT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| EngineError::Connection {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(docker))
    }

    async fn exec_inspect_exit_code(&self, exec_id: &str) -> Result<i64> {
        let details = self
            .client
            .inspect_exec(exec_id)
            .await
            .map_err(map_exec_error)?;
        details
            .exit_code
            .ok_or_else(|| EngineError::Malformed(format!("exec {exec_id} has no exit code")))
    }
}

#[async_trait]
impl SwarmOps for BollardEngine {
    async fn init_swarm(&self, advertise: IpAddr) -> Result<NodeId> {
        let request = SwarmInitRequest {
            listen_addr: Some("0.0.0.0:2377".to_string()),
            advertise_addr: Some(advertise.to_string()),
            ..Default::default()
        };
        let node = self
            .client
            .init_swarm(request)
            .await
            .map_err(map_swarm_error)?;
        Ok(NodeId::new(node))
    }

    async fn join_tokens(&self) -> Result<JoinTokens> {
        let swarm = self.client.inspect_swarm().await.map_err(map_swarm_error)?;
        let tokens = swarm
            .join_tokens
            .ok_or_else(|| EngineError::Malformed("swarm has no join tokens".to_string()))?;
        match (tokens.worker, tokens.manager) {
            (Some(worker), Some(manager)) => Ok(JoinTokens { worker, manager }),
            _ => Err(EngineError::Malformed(
                "swarm join tokens incomplete".to_string(),
            )),
        }
    }

    async fn join_swarm(&self, advertise: IpAddr, manager_addr: &str, token: &str) -> Result<()> {
        let request = SwarmJoinRequest {
            listen_addr: Some("0.0.0.0:2377".to_string()),
            advertise_addr: Some(advertise.to_string()),
            remote_addrs: Some(vec![manager_addr.to_string()]),
            join_token: Some(token.to_string()),
            ..Default::default()
        };
        self.client
            .join_swarm(request)
            .await
            .map_err(map_swarm_error)
    }

    async fn node_id(&self) -> Result<NodeId> {
        let info = self.client.info().await.map_err(map_api_error)?;
        info.swarm
            .and_then(|s| s.node_id)
            .filter(|id| !id.is_empty())
            .map(NodeId::new)
            .ok_or_else(|| EngineError::NotInSwarm("engine reports no node id".to_string()))
    }

    async fn promote(&self, node: &NodeId) -> Result<()> {
        let current = self
            .client
            .inspect_node(node.as_str())
            .await
            .map_err(map_swarm_error)?;
        let version = current
            .version
            .and_then(|v| v.index)
            .ok_or_else(|| EngineError::Malformed(format!("node {node} has no version")))?;

        let spec = NodeSpec {
            role: Some(NodeSpecRoleEnum::MANAGER),
            ..current.spec.unwrap_or_default()
        };
        let options = UpdateNodeOptions {
            version: version as i64,
            ..Default::default()
        };

        self.client
            .update_node(node.as_str(), spec, options)
            .await
            .map_err(map_swarm_error)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeView>> {
        let nodes = self
            .client
            .list_nodes(None::<ListNodesOptions>)
            .await
            .map_err(map_swarm_error)?;

        Ok(nodes
            .into_iter()
            .map(|n| {
                let status = n.status.unwrap_or_default();
                NodeView {
                    id: NodeId::new(n.id.unwrap_or_default()),
                    hostname: n
                        .description
                        .and_then(|d| d.hostname)
                        .unwrap_or_default(),
                    addr: status.addr,
                    ready: status.state == Some(NodeState::READY),
                    manager: n.spec.and_then(|s| s.role) == Some(NodeSpecRoleEnum::MANAGER),
                }
            })
            .collect())
    }
}

#[async_trait]
impl NetworkOps for BollardEngine {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<OverlayNetwork> {
        let request = NetworkCreateRequest {
            name: spec.name.clone(),
            driver: Some("overlay".to_string()),
            attachable: Some(spec.attachable),
            ipam: Some(Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some(spec.subnet.clone()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .client
            .create_network(request)
            .await
            .map_err(map_api_error)?;

        Ok(OverlayNetwork {
            id: NetworkId::new(response.id),
            name: spec.name.clone(),
        })
    }
}

#[async_trait]
impl ServiceOps for BollardEngine {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<ServiceId> {
        let response = self
            .client
            .create_service(service_spec(spec), None)
            .await
            .map_err(map_api_error)?;
        response
            .id
            .map(ServiceId::new)
            .ok_or_else(|| EngineError::Malformed(format!("service {} has no id", spec.name)))
    }

    async fn inspect_service(&self, name: &str) -> Result<ServiceView> {
        let service = self
            .client
            .inspect_service(name, None::<InspectServiceOptions>)
            .await
            .map_err(map_api_error)?;

        let replicas = service
            .spec
            .as_ref()
            .and_then(|s| s.mode.as_ref())
            .and_then(|m| m.replicated.as_ref())
            .and_then(|r| r.replicas)
            .unwrap_or(0);

        let published_ports = service
            .endpoint
            .and_then(|e| e.ports)
            .unwrap_or_default()
            .iter()
            .filter_map(published_port)
            .collect();

        Ok(ServiceView {
            id: ServiceId::new(service.id.unwrap_or_default()),
            name: name.to_string(),
            replicas: u64::try_from(replicas).unwrap_or(0),
            published_ports,
        })
    }

    async fn list_tasks(&self, service: &str) -> Result<Vec<TaskView>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("service".to_string(), vec![service.to_string()]);
        let options = ListTasksOptions {
            filters: Some(filters),
            ..Default::default()
        };

        let tasks = self
            .client
            .list_tasks(Some(options))
            .await
            .map_err(map_api_error)?;

        Ok(tasks
            .into_iter()
            .map(|t| {
                let status = t.status.unwrap_or_default();
                TaskView {
                    id: TaskId::new(t.id.unwrap_or_default()),
                    node_id: t.node_id.map(NodeId::new),
                    container_id: status
                        .container_status
                        .and_then(|c| c.container_id)
                        .map(ContainerId::new),
                    running: status.state == Some(TaskState::RUNNING),
                }
            })
            .collect())
    }
}

#[async_trait]
impl ExecOps for BollardEngine {
    async fn exec(&self, container: &ContainerId, request: &ExecRequest) -> Result<ExecOutput> {
        let config = bollard::models::ExecConfig {
            cmd: Some(request.cmd.clone()),
            env: if request.env.is_empty() {
                None
            } else {
                Some(request.env.clone())
            },
            attach_stdin: Some(request.stdin.is_some()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let created = self
            .client
            .create_exec(container.as_str(), config)
            .await
            .map_err(map_exec_error)?;

        let started = self
            .client
            .start_exec(
                &created.id,
                Some(StartExecOptions {
                    detach: false,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_exec_error)?;

        let mut output = Vec::new();
        if let StartExecResults::Attached {
            output: mut stream,
            mut input,
        } = started
        {
            if let Some(stdin) = &request.stdin {
                input
                    .write_all(stdin)
                    .await
                    .map_err(|e| EngineError::Exec(format!("failed to write stdin: {e}")))?;
                input
                    .shutdown()
                    .await
                    .map_err(|e| EngineError::Exec(format!("failed to close stdin: {e}")))?;
            }
            drop(input);

            while let Some(item) = stream.next().await {
                match item {
                    Ok(bollard::container::LogOutput::StdOut { message })
                    | Ok(bollard::container::LogOutput::StdErr { message })
                    | Ok(bollard::container::LogOutput::Console { message }) => {
                        output.extend_from_slice(&message);
                    }
                    Ok(_) => {}
                    Err(e) => return Err(EngineError::Exec(e.to_string())),
                }
            }
        }

        let exit_code = self.exec_inspect_exit_code(&created.id).await?;
        Ok(ExecOutput {
            exit_code,
            output: String::from_utf8_lossy(&output).into_owned(),
        })
    }
}

// =============================================================================
// TlsConnector
// =============================================================================

/// Connects to machines with the run's client certificate.
#[derive(Debug, Clone)]
pub struct TlsConnector {
    client: ClientCertificate,
}

impl TlsConnector {
    pub fn new(client: ClientCertificate) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EngineConnector for TlsConnector {
    async fn connect(&self, machine: &Machine) -> Result<Arc<dyn Engine>> {
        let endpoint = machine.engine_endpoint();
        tracing::debug!("connecting to engine of {} at {}", machine.name(), endpoint);
        let engine = BollardEngine::connect_tls(&endpoint, &self.client)?;
        engine
            .client
            .ping()
            .await
            .map_err(|e| EngineError::Connection {
                endpoint,
                reason: e.to_string(),
            })?;
        Ok(Arc::new(engine))
    }
}
