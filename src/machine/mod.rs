// ABOUTME: Provisioned machines and the provisioner that creates them.
// ABOUTME: A machine couples its addresses and TLS material with a remote exec handle.

mod provisioner;
mod remote;

pub use provisioner::{ProvisionError, ProvisionStep, Provisioner};
pub use remote::{RemoteExec, privileged, write_remote_bytes, write_remote_file};

use crate::driver::{DriverOptions, MachineHandle};
use crate::types::MachineName;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// TLS port the engine listens on after the fix-up step.
pub const ENGINE_TLS_PORT: u16 = 2376;

/// A created machine that belongs to this run.
#[derive(Clone)]
pub struct Machine {
    name: MachineName,
    hostname: String,
    public_ip: IpAddr,
    private_ip: IpAddr,
    tls_dir: PathBuf,
    options: DriverOptions,
    ssh_user: String,
    remote: Arc<dyn RemoteExec>,
}

impl Machine {
    pub fn new(
        name: MachineName,
        handle: MachineHandle,
        tls_dir: impl Into<PathBuf>,
        options: DriverOptions,
    ) -> Self {
        Self {
            name,
            hostname: handle.hostname,
            public_ip: handle.public_ip,
            private_ip: handle.private_ip,
            tls_dir: tls_dir.into(),
            options,
            ssh_user: handle.ssh_user,
            remote: handle.remote,
        }
    }

    pub fn name(&self) -> &MachineName {
        &self.name
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn public_ip(&self) -> IpAddr {
        self.public_ip
    }

    pub fn private_ip(&self) -> IpAddr {
        self.private_ip
    }

    /// `tcp://<public-ip>:2376`
    pub fn engine_endpoint(&self) -> String {
        format!("tcp://{}", socket_addr(self.public_ip, ENGINE_TLS_PORT))
    }

    /// Directory holding this machine's server certificate and key.
    pub fn tls_dir(&self) -> &Path {
        &self.tls_dir
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn ssh_user(&self) -> &str {
        &self.ssh_user
    }

    pub fn remote(&self) -> &dyn RemoteExec {
        self.remote.as_ref()
    }

    /// Run `command` on the machine, via sudo unless the SSH user is root.
    pub async fn run_privileged(&self, command: &str) -> crate::ssh::Result<String> {
        self.remote.run(&privileged(&self.ssh_user, command)).await
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.name)
            .field("hostname", &self.hostname)
            .field("public_ip", &self.public_ip)
            .field("private_ip", &self.private_ip)
            .finish_non_exhaustive()
    }
}

/// Format `ip:port`, bracketing IPv6 addresses.
pub fn socket_addr(ip: IpAddr, port: u16) -> String {
    std::net::SocketAddr::new(ip, port).to_string()
}
