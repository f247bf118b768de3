// ABOUTME: In-memory stand-ins for the driver, remote shell, engine and bootstrapper.
// ABOUTME: Each records its calls so tests can assert on order and arguments.

use async_trait::async_trait;
use flotilla::bootstrap::{BootstrapAction, BootstrapError, Bootstrapper};
use flotilla::driver::{DriverError, DriverOptions, MachineDriver, MachineHandle};
use flotilla::engine::{
    EngineConnector, EngineError, Engine, ExecOps, ExecOutput, ExecRequest, JoinTokens,
    NetworkOps, NetworkSpec, NodeView, OverlayNetwork, ServiceOps, ServiceSpec, ServiceView,
    SwarmOps, TaskView,
};
use flotilla::install::BootstrapPlan;
use flotilla::machine::{Machine, RemoteExec};
use flotilla::ssh;
use flotilla::types::{
    ContainerId, MachineName, MachineNamer, NetworkId, NodeId, ServiceId, TargetName, TaskId,
};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Remote shell
// =============================================================================

#[derive(Default)]
pub struct StubRemote {
    commands: Mutex<Vec<String>>,
    inputs: Mutex<Vec<(String, Vec<u8>)>>,
    fail_matching: Option<String>,
}

impl StubRemote {
    /// Fail every command containing `needle`.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_matching: Some(needle.to_string()),
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn inputs(&self) -> Vec<(String, Vec<u8>)> {
        self.inputs.lock().clone()
    }

    fn check(&self, command: &str) -> ssh::Result<String> {
        self.commands.lock().push(command.to_string());
        match &self.fail_matching {
            Some(needle) if command.contains(needle.as_str()) => Err(ssh::Error::NonZeroExit {
                command: command.to_string(),
                exit_code: 1,
                stderr: "stub failure".to_string(),
            }),
            _ => Ok(String::new()),
        }
    }
}

#[async_trait]
impl RemoteExec for StubRemote {
    async fn run(&self, command: &str) -> ssh::Result<String> {
        self.check(command)
    }

    async fn run_with_input(&self, command: &str, input: &[u8]) -> ssh::Result<String> {
        self.inputs.lock().push((command.to_string(), input.to_vec()));
        self.check(command)
    }
}

// =============================================================================
// Machine driver
// =============================================================================

/// Hands out machine `n` at public 203.0.113.n, private 10.0.0.n, hostname node-n.
pub struct StubDriver {
    name: String,
    creates: AtomicUsize,
    fail_create_at: Option<usize>,
    remote_failure: Option<String>,
    fail_remove: Option<String>,
    created: Mutex<Vec<(MachineName, DriverOptions, Arc<StubRemote>)>>,
    removed: Mutex<Vec<MachineName>>,
}

impl StubDriver {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            creates: AtomicUsize::new(0),
            fail_create_at: None,
            remote_failure: None,
            fail_remove: None,
            created: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    /// Fail the `n`th create call (1-based).
    pub fn failing_create_at(mut self, n: usize) -> Self {
        self.fail_create_at = Some(n);
        self
    }

    /// Every machine's shell fails commands containing `needle`.
    pub fn failing_remote(mut self, needle: &str) -> Self {
        self.remote_failure = Some(needle.to_string());
        self
    }

    pub fn failing_remove(mut self, machine: &str) -> Self {
        self.fail_remove = Some(machine.to_string());
        self
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn created_options(&self) -> Vec<DriverOptions> {
        self.created.lock().iter().map(|(_, o, _)| o.clone()).collect()
    }

    pub fn remote(&self, index: usize) -> Arc<StubRemote> {
        Arc::clone(&self.created.lock()[index].2)
    }

    pub fn removed(&self) -> Vec<MachineName> {
        self.removed.lock().clone()
    }
}

pub fn public_ip(n: usize) -> IpAddr {
    format!("203.0.113.{n}").parse().unwrap()
}

pub fn private_ip(n: usize) -> IpAddr {
    format!("10.0.0.{n}").parse().unwrap()
}

#[async_trait]
impl MachineDriver for StubDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(
        &self,
        name: &MachineName,
        options: &DriverOptions,
    ) -> Result<MachineHandle, DriverError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_create_at == Some(n) {
            return Err(DriverError::Other(format!("stub refused to create {name}")));
        }
        let remote = Arc::new(match &self.remote_failure {
            Some(needle) => StubRemote::failing_on(needle),
            None => StubRemote::default(),
        });
        self.created
            .lock()
            .push((name.clone(), options.clone(), Arc::clone(&remote)));
        Ok(MachineHandle {
            hostname: format!("node-{n}"),
            public_ip: public_ip(n),
            private_ip: private_ip(n),
            ssh_user: "root".to_string(),
            remote,
        })
    }

    async fn remove(&self, name: &MachineName) -> Result<(), DriverError> {
        if self.fail_remove.as_deref() == Some(name.as_str()) {
            return Err(DriverError::UnknownMachine(name.to_string()));
        }
        self.removed.lock().push(name.clone());
        Ok(())
    }
}

/// `n` machines created straight through `driver`, without provisioning.
pub async fn stub_machines(driver: &StubDriver, n: usize) -> Vec<Machine> {
    let namer = MachineNamer::new(TargetName::new("test").unwrap());
    let mut machines = Vec::with_capacity(n);
    for _ in 0..n {
        let name = namer.next_name();
        let handle = driver.create(&name, &DriverOptions::new()).await.unwrap();
        let tls_dir = PathBuf::from("/tmp/flotilla-test").join(name.as_str());
        machines.push(Machine::new(name, handle, tls_dir, DriverOptions::new()));
    }
    machines
}

// =============================================================================
// Engine
// =============================================================================

/// Swarm-wide state shared by every stub engine of one test.
#[derive(Default)]
pub struct SwarmState {
    pub initialized_on: Option<(String, IpAddr)>,
    pub nodes: Vec<NodeView>,
    pub joins: Vec<(String, String)>,
    pub promotions: Vec<NodeId>,
    pub networks: Vec<NetworkSpec>,
    pub services: Vec<ServiceSpec>,
    pub execs: Vec<(String, ContainerId, ExecRequest)>,
}

impl SwarmState {
    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[derive(Default)]
pub struct Behavior {
    pub fail_join_on: Option<String>,
    pub fail_service: Option<String>,
    pub exec_exit_code: i64,
}

fn node_id(hostname: &str) -> NodeId {
    NodeId::new(format!("id-{hostname}"))
}

pub struct StubEngine {
    hostname: String,
    state: Arc<Mutex<SwarmState>>,
    behavior: Arc<Behavior>,
}

#[async_trait]
impl SwarmOps for StubEngine {
    async fn init_swarm(&self, advertise: IpAddr) -> Result<NodeId, EngineError> {
        let mut state = self.state.lock();
        if state.initialized_on.is_some() {
            return Err(EngineError::Conflict("swarm already initialized".into()));
        }
        state.initialized_on = Some((self.hostname.clone(), advertise));
        state.nodes.push(NodeView {
            id: node_id(&self.hostname),
            hostname: self.hostname.clone(),
            addr: Some(advertise.to_string()),
            ready: true,
            manager: true,
        });
        Ok(node_id(&self.hostname))
    }

    async fn join_tokens(&self) -> Result<JoinTokens, EngineError> {
        Ok(JoinTokens {
            worker: "SWMTKN-worker".to_string(),
            manager: "SWMTKN-manager".to_string(),
        })
    }

    async fn join_swarm(
        &self,
        advertise: IpAddr,
        manager_addr: &str,
        token: &str,
    ) -> Result<(), EngineError> {
        if self.behavior.fail_join_on.as_deref() == Some(self.hostname.as_str()) {
            return Err(EngineError::Api("join refused".into()));
        }
        assert_eq!(token, "SWMTKN-worker");
        let mut state = self.state.lock();
        state
            .joins
            .push((self.hostname.clone(), manager_addr.to_string()));
        state.nodes.push(NodeView {
            id: node_id(&self.hostname),
            hostname: self.hostname.clone(),
            addr: Some(advertise.to_string()),
            ready: true,
            manager: false,
        });
        Ok(())
    }

    async fn node_id(&self) -> Result<NodeId, EngineError> {
        Ok(node_id(&self.hostname))
    }

    async fn promote(&self, node: &NodeId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let entry = state
            .nodes
            .iter_mut()
            .find(|n| &n.id == node)
            .ok_or_else(|| EngineError::NotFound(node.to_string()))?;
        entry.manager = true;
        state.promotions.push(node.clone());
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeView>, EngineError> {
        Ok(self.state.lock().nodes.clone())
    }
}

#[async_trait]
impl NetworkOps for StubEngine {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<OverlayNetwork, EngineError> {
        self.state.lock().networks.push(spec.clone());
        Ok(OverlayNetwork {
            id: NetworkId::new(format!("net-{}", spec.name)),
            name: spec.name.clone(),
        })
    }
}

#[async_trait]
impl ServiceOps for StubEngine {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<ServiceId, EngineError> {
        if self.behavior.fail_service.as_deref() == Some(spec.name.as_str()) {
            return Err(EngineError::Api(format!("cannot schedule {}", spec.name)));
        }
        let mut state = self.state.lock();
        if state.service(&spec.name).is_some() {
            return Err(EngineError::Conflict(spec.name.clone()));
        }
        state.services.push(spec.clone());
        Ok(ServiceId::new(format!("svc-{}", spec.name)))
    }

    async fn inspect_service(&self, name: &str) -> Result<ServiceView, EngineError> {
        let state = self.state.lock();
        let spec = state
            .service(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        Ok(ServiceView {
            id: ServiceId::new(format!("svc-{name}")),
            name: name.to_string(),
            replicas: spec.replicas,
            published_ports: spec.ports.clone(),
        })
    }

    async fn list_tasks(&self, service: &str) -> Result<Vec<TaskView>, EngineError> {
        let state = self.state.lock();
        if state.service(service).is_none() {
            return Ok(Vec::new());
        }
        // Every task runs on the node the swarm was initialized on.
        let node = state.nodes.first().map(|n| n.id.clone());
        Ok(vec![TaskView {
            id: TaskId::new(format!("task-{service}")),
            node_id: node,
            container_id: Some(ContainerId::new(format!("ctr-{service}"))),
            running: true,
        }])
    }
}

#[async_trait]
impl ExecOps for StubEngine {
    async fn exec(
        &self,
        container: &ContainerId,
        request: &ExecRequest,
    ) -> Result<ExecOutput, EngineError> {
        self.state
            .lock()
            .execs
            .push((self.hostname.clone(), container.clone(), request.clone()));
        Ok(ExecOutput {
            exit_code: self.behavior.exec_exit_code,
            output: "Username: Password: Confirm: created\n".to_string(),
        })
    }
}

#[derive(Default)]
pub struct StubConnector {
    pub state: Arc<Mutex<SwarmState>>,
    pub behavior: Arc<Behavior>,
    connected: Mutex<Vec<MachineName>>,
}

impl StubConnector {
    pub fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior: Arc::new(behavior),
            ..Default::default()
        }
    }

    pub fn connected(&self) -> Vec<MachineName> {
        self.connected.lock().clone()
    }
}

#[async_trait]
impl EngineConnector for StubConnector {
    async fn connect(&self, machine: &Machine) -> Result<Arc<dyn Engine>, EngineError> {
        self.connected.lock().push(machine.name().clone());
        Ok(Arc::new(StubEngine {
            hostname: machine.hostname().to_string(),
            state: Arc::clone(&self.state),
            behavior: Arc::clone(&self.behavior),
        }))
    }
}

// =============================================================================
// Bootstrapper
// =============================================================================

#[derive(Default)]
pub struct StubBootstrapper {
    pub fail_bootstrap: bool,
    bootstraps: Mutex<Vec<(String, BootstrapPlan)>>,
    registrations: Mutex<Vec<(String, Vec<IpAddr>)>>,
}

impl StubBootstrapper {
    pub fn failing() -> Self {
        Self {
            fail_bootstrap: true,
            ..Default::default()
        }
    }

    pub fn bootstraps(&self) -> Vec<(String, BootstrapPlan)> {
        self.bootstraps.lock().clone()
    }

    pub fn registrations(&self) -> Vec<(String, Vec<IpAddr>)> {
        self.registrations.lock().clone()
    }
}

#[async_trait]
impl Bootstrapper for StubBootstrapper {
    async fn bootstrap(&self, url: &str, plan: &BootstrapPlan) -> Result<(), BootstrapError> {
        self.bootstraps.lock().push((url.to_string(), plan.clone()));
        if self.fail_bootstrap {
            return Err(BootstrapError::CommandFailed {
                action: BootstrapAction::Bootstrap,
                exit_code: Some(1),
                stderr: "control plane rejected plan".to_string(),
            });
        }
        Ok(())
    }

    async fn register_nodes(&self, url: &str, nodes: &[IpAddr]) -> Result<(), BootstrapError> {
        self.registrations
            .lock()
            .push((url.to_string(), nodes.to_vec()));
        Ok(())
    }
}
